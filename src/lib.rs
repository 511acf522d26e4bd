//! vsphone-guardian: cloud-phone app supervisor
//!
//! Keeps a designated app running on every configured remote Android device.
//!
//! ## Architecture
//!
//! - **Signing**: HMAC-SHA256 request signing for the control-plane API
//! - **Control Plane**: device listing, detail and restart over signed HTTP
//! - **Device Agent**: ADB probe, stop and deep-link launch
//! - **Recovery Engine**: per-app stop → wait → launch cycle with a per-tick ledger
//! - **Scheduler**: fixed-cadence ticks, accounts in parallel, devices in order
//! - **Stats**: durable counters rewritten atomically after each tick

pub mod config;
pub mod control_plane;
pub mod device;
pub mod notify;
pub mod recovery;
pub mod scheduler;
pub mod signing;
pub mod stats;
pub mod storage;
pub mod types;

pub use config::{ConfigError, MonitorConfig};
pub use control_plane::{ControlPlane, ControlPlaneError, HttpControlPlane};
pub use device::{AdbAgent, AgentError, DeviceAgent};
pub use recovery::{RecoveryEngine, RecoverySettings, TickLedger};
pub use scheduler::{AppContext, MonitorScheduler, TickSummary};
pub use stats::{Stats, StatsStore};
pub use types::{
    Account, AccountReport, AppTarget, Credential, Device, DeviceReport, RecoveryAttempt,
    RecoveryOutcome, SkipReason, StatsDelta,
};
