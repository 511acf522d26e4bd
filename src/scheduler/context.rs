//! Explicitly constructed application context.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::{MonitorConfig, OfflinePolicy};
use crate::control_plane::{ControlPlane, ControlPlaneError, HttpControlPlane};
use crate::device::DeviceAgent;
use crate::notify::{TickNotifier, WebhookNotifier};
use crate::recovery::{RecoveryEngine, RecoverySettings};
use crate::stats::StatsStore;
use crate::types::Account;

/// One account and the control-plane client signed with its credentials.
#[derive(Clone)]
pub struct AccountRuntime {
    pub account: Account,
    pub control_plane: Arc<dyn ControlPlane>,
}

/// Loop tuning derived from the config.
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub check_interval: Duration,
    pub error_cooldown: Duration,
    pub max_concurrent_accounts: usize,
    pub offline_policy: OfflinePolicy,
    pub restart_offline_devices: bool,
    /// Upper bound on fetching the whole device listing for one account.
    pub listing_timeout: Duration,
    pub page_size: u32,
    pub max_pages: u32,
}

impl SchedulerSettings {
    pub fn from_config(config: &MonitorConfig) -> Self {
        let m = &config.monitoring;
        Self {
            check_interval: Duration::from_secs(m.check_interval_seconds),
            error_cooldown: Duration::from_secs(m.error_cooldown_seconds),
            max_concurrent_accounts: m.max_concurrent_accounts,
            offline_policy: m.offline_policy,
            restart_offline_devices: m.restart_offline_devices,
            listing_timeout: Duration::from_secs(config.api.timeout_seconds),
            page_size: config.api.page_size,
            max_pages: config.api.max_pages,
        }
    }

    /// Worker pool size for `accounts` accounts.
    pub fn worker_count(&self, accounts: usize) -> usize {
        accounts.min(self.max_concurrent_accounts).max(1)
    }
}

/// Everything a tick needs. Shared read-only with account workers.
pub struct AppContext {
    pub accounts: Vec<AccountRuntime>,
    pub engine: RecoveryEngine,
    pub settings: SchedulerSettings,
    pub stats_store: StatsStore,
    pub notifier: Option<Arc<dyn TickNotifier>>,
    pub cancel: CancellationToken,
}

impl AppContext {
    /// Wire the production implementations from a validated config.
    pub fn from_config(
        config: &MonitorConfig,
        agent: Arc<dyn DeviceAgent>,
        stats_store: StatsStore,
        cancel: CancellationToken,
    ) -> Result<Self, ControlPlaneError> {
        let accounts = config
            .to_accounts()
            .into_iter()
            .map(|account| -> Result<AccountRuntime, ControlPlaneError> {
                let client = HttpControlPlane::new(&config.api, account.credential.clone())?;
                Ok(AccountRuntime {
                    account,
                    control_plane: Arc::new(client) as Arc<dyn ControlPlane>,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let notifier = config.monitoring.webhook().and_then(|url| match WebhookNotifier::new(url) {
            Ok(n) => Some(Arc::new(n) as Arc<dyn TickNotifier>),
            Err(e) => {
                warn!(error = %e, "Webhook notifier disabled");
                None
            }
        });

        Ok(Self {
            accounts,
            engine: RecoveryEngine::new(agent, RecoverySettings::from_config(&config.monitoring)),
            settings: SchedulerSettings::from_config(config),
            stats_store,
            notifier,
            cancel,
        })
    }
}
