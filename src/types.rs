//! Domain types shared across the supervisor.
//!
//! The account → device → app tree is built once from configuration and is
//! immutable for the lifetime of the process. Per-tick results
//! ([`RecoveryAttempt`], [`DeviceReport`], [`AccountReport`]) are transient and
//! flow back to the scheduler, which is the only place they are aggregated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Configuration Tree
// ============================================================================

/// Control-plane credentials for one account.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub access_key: String,
    pub secret_key: String,
}

impl Credential {
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        }
    }

    /// First few characters of the access key, safe for logs.
    pub fn access_key_hint(&self) -> String {
        let prefix: String = self.access_key.chars().take(6).collect();
        format!("{prefix}...")
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_key", &self.access_key_hint())
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// A control-plane account and the devices it owns.
#[derive(Debug, Clone)]
pub struct Account {
    pub name: String,
    pub credential: Credential,
    pub devices: Vec<Device>,
}

/// A remote device reachable over the device-control channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub device_id: String,
    pub display_name: String,
    /// `host` or `host:port`
    pub address: String,
    pub apps: Vec<AppTarget>,
}

/// An application that must stay running on a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppTarget {
    pub package: String,
    /// Full deep-link URL or a bare share code.
    pub launch_reference: String,
    pub display_name: String,
}

// ============================================================================
// Recovery Results
// ============================================================================

/// Final outcome of evaluating one (device, app) pair during a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryOutcome {
    /// Process was already running; nothing done.
    Running,
    /// Process was down and the stop → wait → launch cycle succeeded.
    RestartedOk,
    /// Process was down and the launch call failed.
    RestartFailed,
    /// The device-control channel could not be opened.
    ConnectFailed,
    /// Process was down but the device's restart budget for this tick is spent.
    Deferred,
}

impl RecoveryOutcome {
    pub fn is_failure(self) -> bool {
        matches!(self, Self::RestartFailed | Self::ConnectFailed)
    }
}

impl std::fmt::Display for RecoveryOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "RUNNING"),
            Self::RestartedOk => write!(f, "RESTARTED"),
            Self::RestartFailed => write!(f, "RESTART FAILED"),
            Self::ConnectFailed => write!(f, "CONNECT FAILED"),
            Self::Deferred => write!(f, "DEFERRED"),
        }
    }
}

/// Record of one (device, app) evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryAttempt {
    pub device_id: String,
    pub package: String,
    pub app_name: String,
    pub outcome: RecoveryOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Outcome repeated from an earlier cycle of the same tick; no commands
    /// were sent and nothing is counted.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub replayed: bool,
    pub timestamp: DateTime<Utc>,
}

/// Why a device was not checked this tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The control plane reports the device offline.
    ReportedOffline,
    /// Shutdown was requested before the device was reached.
    Cancelled,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReportedOffline => write!(f, "reported offline by control plane"),
            Self::Cancelled => write!(f, "shutdown requested"),
        }
    }
}

/// Everything that happened to one device during a tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceReport {
    pub device_id: String,
    pub display_name: String,
    /// Online hint from the control plane, if one was available.
    pub online_hint: Option<bool>,
    pub skipped: Option<SkipReason>,
    pub attempts: Vec<RecoveryAttempt>,
    /// A control-plane restart was requested for this (offline) device.
    pub reboot_requested: bool,
}

impl DeviceReport {
    pub fn new(device: &Device, online_hint: Option<bool>) -> Self {
        Self {
            device_id: device.device_id.clone(),
            display_name: device.display_name.clone(),
            online_hint,
            skipped: None,
            attempts: Vec::new(),
            reboot_requested: false,
        }
    }

    /// Attempts with `outcome`, replays excluded.
    pub fn count(&self, outcome: RecoveryOutcome) -> u64 {
        self.attempts
            .iter()
            .filter(|a| !a.replayed && a.outcome == outcome)
            .count() as u64
    }

    pub fn connect_failed(&self) -> bool {
        self.attempts
            .iter()
            .any(|a| a.outcome == RecoveryOutcome::ConnectFailed)
    }
}

/// Per-account contribution to the statistics of one tick.
///
/// Workers build deltas; only the scheduler folds them into [`crate::stats::Stats`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsDelta {
    pub restarts: u64,
    pub per_device_restarts: BTreeMap<String, u64>,
    pub connect_failures: u64,
    pub restart_failures: u64,
    pub device_reboots: u64,
}

impl StatsDelta {
    pub fn from_reports(reports: &[DeviceReport]) -> Self {
        let mut delta = Self::default();
        for report in reports {
            let restarts = report.count(RecoveryOutcome::RestartedOk);
            if restarts > 0 {
                delta.restarts += restarts;
                *delta
                    .per_device_restarts
                    .entry(report.device_id.clone())
                    .or_insert(0) += restarts;
            }
            if report.connect_failed() {
                delta.connect_failures += 1;
            }
            delta.restart_failures += report.count(RecoveryOutcome::RestartFailed);
            if report.reboot_requested {
                delta.device_reboots += 1;
            }
        }
        delta
    }

    pub fn merge(&mut self, other: &Self) {
        self.restarts += other.restarts;
        for (device, count) in &other.per_device_restarts {
            *self.per_device_restarts.entry(device.clone()).or_insert(0) += count;
        }
        self.connect_failures += other.connect_failures;
        self.restart_failures += other.restart_failures;
        self.device_reboots += other.device_reboots;
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Result of evaluating one account during a tick.
#[derive(Debug, Clone)]
pub struct AccountReport {
    pub account: String,
    /// `false` when the control-plane listing failed and no hints were used.
    pub hints_available: bool,
    pub hint_error: Option<String>,
    pub devices: Vec<DeviceReport>,
}

impl AccountReport {
    pub fn delta(&self) -> StatsDelta {
        StatsDelta::from_reports(&self.devices)
    }

    pub fn attempts(&self) -> impl Iterator<Item = &RecoveryAttempt> {
        self.devices.iter().flat_map(|d| d.attempts.iter())
    }
}
