//! Monitor Configuration Module
//!
//! Loads the account/device/app tree and loop tuning from a JSON or TOML
//! document.
//!
//! ## Loading Order
//!
//! 1. `--config <path>` on the command line
//! 2. `VSPHONE_GUARDIAN_CONFIG` environment variable
//! 3. `config.json`, then `config.toml` in the current working directory
//!
//! A missing file is fatal. The loaded config is passed around explicitly
//! (see [`crate::scheduler::AppContext`]); there is no global instance.

mod monitor_config;
pub mod defaults;
pub mod validation;

pub use monitor_config::*;
