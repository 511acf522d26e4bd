//! Recovery Engine: per (device, app) health check and restart cycle
//!
//! ```text
//! Unknown ──connect ok──▶ Connected ──query──▶ Running
//!    │                        │
//!    └─connect fail─▶ ConnectFailed           └──▶ NotRunning ─▶ Stopping ─▶ Waiting ─▶ Launching
//!                                                      │                                 │
//!                                              (budget spent)                  RestartedOk / RestartFailed
//!                                                      ▼
//!                                                   Deferred
//! ```
//!
//! A failed launch is not retried within the tick; the next tick starts again
//! from `Unknown`.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::link::normalize_launch_reference;
use crate::config::MonitoringConfig;
use crate::device::DeviceAgent;
use crate::types::{AppTarget, Device, RecoveryAttempt, RecoveryOutcome};

/// Tunables of the restart cycle.
#[derive(Debug, Clone)]
pub struct RecoverySettings {
    /// Pause between force-stop and launch.
    pub restart_delay: Duration,
    /// Restart cycles allowed per device per tick.
    pub max_restarts_per_device: u32,
    pub deep_link_template: String,
}

impl RecoverySettings {
    pub fn from_config(config: &MonitoringConfig) -> Self {
        Self {
            restart_delay: Duration::from_secs(config.restart_delay_seconds),
            max_restarts_per_device: config.max_restart_attempts,
            deep_link_template: config.deep_link_template.clone(),
        }
    }
}

/// Intermediate and terminal states of one app evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryState {
    Unknown,
    Connected,
    Running,
    NotRunning,
    Stopping,
    Waiting,
    Launching,
    RestartedOk,
    RestartFailed,
    ConnectFailed,
    Deferred,
}

impl RecoveryState {
    /// Outcome for terminal states, `None` while the cycle is in progress.
    pub fn outcome(self) -> Option<RecoveryOutcome> {
        match self {
            Self::Running => Some(RecoveryOutcome::Running),
            Self::RestartedOk => Some(RecoveryOutcome::RestartedOk),
            Self::RestartFailed => Some(RecoveryOutcome::RestartFailed),
            Self::ConnectFailed => Some(RecoveryOutcome::ConnectFailed),
            Self::Deferred => Some(RecoveryOutcome::Deferred),
            _ => None,
        }
    }
}

/// Restart cycles already performed in the current tick.
///
/// A (device, package) pair gets at most one stop + launch cycle per tick; a
/// repeated evaluation reports the recorded outcome instead.
#[derive(Debug, Default)]
pub struct TickLedger {
    cycles: HashMap<(String, String), RecoveryOutcome>,
}

impl TickLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, device_id: &str, package: &str) -> Option<RecoveryOutcome> {
        self.cycles
            .get(&(device_id.to_string(), package.to_string()))
            .copied()
    }

    fn record(&mut self, device_id: &str, package: &str, outcome: RecoveryOutcome) {
        self.cycles
            .insert((device_id.to_string(), package.to_string()), outcome);
    }

    pub fn len(&self) -> usize {
        self.cycles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cycles.is_empty()
    }
}

/// Drives the recovery state machine over a [`DeviceAgent`].
#[derive(Clone)]
pub struct RecoveryEngine {
    agent: Arc<dyn DeviceAgent>,
    settings: RecoverySettings,
}

impl RecoveryEngine {
    pub fn new(agent: Arc<dyn DeviceAgent>, settings: RecoverySettings) -> Self {
        Self { agent, settings }
    }

    pub fn settings(&self) -> &RecoverySettings {
        &self.settings
    }

    /// Evaluate every app of `device`, in order.
    ///
    /// The channel is opened once per device; if that fails every app is
    /// reported `ConnectFailed` and nothing else is sent to the device.
    /// Cancellation shortens a pending restart delay but never leaves an app
    /// stopped without a launch attempt.
    pub async fn check_device(
        &self,
        device: &Device,
        ledger: &mut TickLedger,
        cancel: &CancellationToken,
    ) -> Vec<RecoveryAttempt> {
        let mut attempts = Vec::with_capacity(device.apps.len());

        if !self.agent.connect(&device.address).await {
            warn!(
                device = %device.device_id,
                address = %device.address,
                apps = device.apps.len(),
                "Device-control channel unavailable"
            );
            for app in &device.apps {
                attempts.push(attempt(
                    device,
                    app,
                    RecoveryOutcome::ConnectFailed,
                    Some(format!("could not connect to {}", device.address)),
                ));
            }
            return attempts;
        }
        trace!(device = %device.device_id, from = ?RecoveryState::Unknown, to = ?RecoveryState::Connected, "state transition");

        let mut cycles_used: u32 = 0;
        for app in &device.apps {
            if let Some(previous) = ledger.get(&device.device_id, &app.package) {
                debug!(device = %device.device_id, package = %app.package, %previous, "Already restarted this tick");
                let mut replay = attempt(
                    device,
                    app,
                    previous,
                    Some("restart cycle already ran this tick".to_string()),
                );
                replay.replayed = true;
                attempts.push(replay);
                continue;
            }

            let (outcome, detail) = self.check_app(device, app, &mut cycles_used, ledger, cancel).await;
            attempts.push(attempt(device, app, outcome, detail));
        }
        attempts
    }

    async fn check_app(
        &self,
        device: &Device,
        app: &AppTarget,
        cycles_used: &mut u32,
        ledger: &mut TickLedger,
        cancel: &CancellationToken,
    ) -> (RecoveryOutcome, Option<String>) {
        let address = device.address.as_str();
        let package = app.package.as_str();
        let mut state = RecoveryState::Connected;
        let mut detail = None;

        loop {
            let next = match state {
                RecoveryState::Unknown => RecoveryState::Connected,
                RecoveryState::Connected => {
                    if self.agent.is_process_running(address, package).await {
                        RecoveryState::Running
                    } else {
                        RecoveryState::NotRunning
                    }
                }
                RecoveryState::NotRunning => {
                    if *cycles_used >= self.settings.max_restarts_per_device {
                        detail = Some(format!(
                            "restart budget of {} per tick spent on this device",
                            self.settings.max_restarts_per_device
                        ));
                        RecoveryState::Deferred
                    } else {
                        *cycles_used += 1;
                        info!(device = %device.device_id, package, app = %app.display_name, "App not running, restarting");
                        RecoveryState::Stopping
                    }
                }
                RecoveryState::Stopping => {
                    if !self.agent.force_stop(address, package).await {
                        warn!(device = %device.device_id, package, "force-stop reported failure, launching anyway");
                    }
                    RecoveryState::Waiting
                }
                RecoveryState::Waiting => {
                    self.restart_delay(device, package, cancel).await;
                    RecoveryState::Launching
                }
                RecoveryState::Launching => {
                    let link = normalize_launch_reference(&app.launch_reference, &self.settings.deep_link_template);
                    let launched = self.agent.launch(address, package, &link).await;
                    let end = if launched {
                        RecoveryState::RestartedOk
                    } else {
                        detail = Some(format!("launch of {link} failed"));
                        RecoveryState::RestartFailed
                    };
                    if let Some(outcome) = end.outcome() {
                        ledger.record(&device.device_id, package, outcome);
                    }
                    end
                }
                terminal => terminal,
            };

            trace!(device = %device.device_id, package, from = ?state, to = ?next, "state transition");
            state = next;

            if let Some(outcome) = state.outcome() {
                return (outcome, detail);
            }
        }
    }

    async fn restart_delay(&self, device: &Device, package: &str, cancel: &CancellationToken) {
        if cancel.is_cancelled() {
            info!(device = %device.device_id, package, "Shutdown pending, skipping restart delay");
            return;
        }
        tokio::select! {
            () = tokio::time::sleep(self.settings.restart_delay) => {}
            () = cancel.cancelled() => {
                info!(device = %device.device_id, package, "Shutdown requested during restart delay, launching now");
            }
        }
    }
}

fn attempt(
    device: &Device,
    app: &AppTarget,
    outcome: RecoveryOutcome,
    detail: Option<String>,
) -> RecoveryAttempt {
    RecoveryAttempt {
        device_id: device.device_id.clone(),
        package: app.package.clone(),
        app_name: app.display_name.clone(),
        outcome,
        detail,
        replayed: false,
        timestamp: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_terminal_states_have_outcomes() {
        for state in [
            RecoveryState::Unknown,
            RecoveryState::Connected,
            RecoveryState::NotRunning,
            RecoveryState::Stopping,
            RecoveryState::Waiting,
            RecoveryState::Launching,
        ] {
            assert!(state.outcome().is_none(), "{state:?}");
        }
        assert_eq!(
            RecoveryState::RestartedOk.outcome(),
            Some(RecoveryOutcome::RestartedOk)
        );
        assert_eq!(
            RecoveryState::Deferred.outcome(),
            Some(RecoveryOutcome::Deferred)
        );
    }

    #[test]
    fn test_ledger_records_per_device_and_package() {
        let mut ledger = TickLedger::new();
        ledger.record("d1", "com.a", RecoveryOutcome::RestartedOk);
        assert_eq!(ledger.get("d1", "com.a"), Some(RecoveryOutcome::RestartedOk));
        assert_eq!(ledger.get("d1", "com.b"), None);
        assert_eq!(ledger.get("d2", "com.a"), None);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_settings_from_config() {
        let settings = RecoverySettings::from_config(&MonitoringConfig::default());
        assert_eq!(settings.restart_delay, Duration::from_secs(5));
        assert_eq!(settings.max_restarts_per_device, 3);
    }
}
