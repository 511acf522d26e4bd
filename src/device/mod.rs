//! Device-control channel.
//!
//! The recovery engine only needs four operations from a device. They report
//! plain booleans: spawn errors, timeouts and non-zero exits are logged by the
//! implementation and folded into `false`.

mod adb;

pub use adb::{launch_command, shell_quote, AdbAgent};

use async_trait::async_trait;

/// Failures of the underlying channel before they are folded into booleans.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("failed to spawn '{binary}': {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },
    #[error("command timed out after {0}s")]
    Timeout(u64),
    #[error("command exited with status {status}: {output}")]
    Failed { status: i32, output: String },
}

/// Operations on one remote device, addressed as `host:port`.
#[async_trait]
pub trait DeviceAgent: Send + Sync {
    /// Open (or confirm) the channel to the device.
    async fn connect(&self, address: &str) -> bool;

    /// Whether a process for `package` is alive. Query only, no side effects.
    async fn is_process_running(&self, address: &str, package: &str) -> bool;

    /// Stop the package. Stopping an already-stopped package succeeds.
    async fn force_stop(&self, address: &str, package: &str) -> bool;

    /// Start the package with a deep link.
    async fn launch(&self, address: &str, package: &str, deep_link: &str) -> bool;
}
