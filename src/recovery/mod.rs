//! App recovery: deep-link building and the per-device restart cycle.

mod engine;
mod link;

pub use engine::{RecoveryEngine, RecoverySettings, RecoveryState, TickLedger};
pub use link::{extract_share_code, has_uri_scheme, normalize_launch_reference};
