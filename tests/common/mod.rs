//! Hand-written fakes shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use vsphone_guardian::config::{defaults, OfflinePolicy};
use vsphone_guardian::control_plane::{ControlPlane, ControlPlaneError, DeviceStatus};
use vsphone_guardian::device::DeviceAgent;
use vsphone_guardian::notify::{NotifyError, TickNotifier};
use vsphone_guardian::recovery::{RecoveryEngine, RecoverySettings};
use vsphone_guardian::scheduler::{AccountRuntime, AppContext, SchedulerSettings};
use vsphone_guardian::stats::StatsStore;
use vsphone_guardian::types::{Account, AppTarget, Credential, Device, RecoveryAttempt};

pub const GAME: &str = "com.roblox.client";
pub const SHARE_CODE: &str = "abc123";

// ============================================================================
// Device Agent
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentCall {
    Connect(String),
    Query(String, String),
    Stop(String, String),
    Launch(String, String, String),
}

/// In-memory device fleet. Apps are stopped unless marked running; a
/// successful launch marks the app running.
#[derive(Default)]
pub struct FakeAgent {
    unreachable: Mutex<HashSet<String>>,
    running: Mutex<HashSet<(String, String)>>,
    failing_launch: Mutex<HashSet<(String, String)>>,
    calls: Mutex<Vec<(AgentCall, Instant)>>,
}

impl FakeAgent {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_unreachable(&self, address: &str) {
        self.unreachable.lock().unwrap().insert(address.to_string());
    }

    pub fn set_running(&self, address: &str, package: &str) {
        self.running
            .lock()
            .unwrap()
            .insert((address.to_string(), package.to_string()));
    }

    pub fn set_launch_fails(&self, address: &str, package: &str) {
        self.failing_launch
            .lock()
            .unwrap()
            .insert((address.to_string(), package.to_string()));
    }

    pub fn calls(&self) -> Vec<AgentCall> {
        self.calls.lock().unwrap().iter().map(|(c, _)| c.clone()).collect()
    }

    pub fn timed_calls(&self) -> Vec<(AgentCall, Instant)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn launches(&self) -> Vec<(String, String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                AgentCall::Launch(a, p, l) => Some((a, p, l)),
                _ => None,
            })
            .collect()
    }

    pub fn calls_for(&self, address: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| match c {
                AgentCall::Connect(a)
                | AgentCall::Query(a, _)
                | AgentCall::Stop(a, _)
                | AgentCall::Launch(a, _, _) => a == address,
            })
            .count()
    }

    fn log(&self, call: AgentCall) {
        self.calls.lock().unwrap().push((call, Instant::now()));
    }
}

#[async_trait]
impl DeviceAgent for FakeAgent {
    async fn connect(&self, address: &str) -> bool {
        self.log(AgentCall::Connect(address.to_string()));
        !self.unreachable.lock().unwrap().contains(address)
    }

    async fn is_process_running(&self, address: &str, package: &str) -> bool {
        self.log(AgentCall::Query(address.to_string(), package.to_string()));
        self.running
            .lock()
            .unwrap()
            .contains(&(address.to_string(), package.to_string()))
    }

    async fn force_stop(&self, address: &str, package: &str) -> bool {
        self.log(AgentCall::Stop(address.to_string(), package.to_string()));
        true
    }

    async fn launch(&self, address: &str, package: &str, deep_link: &str) -> bool {
        self.log(AgentCall::Launch(
            address.to_string(),
            package.to_string(),
            deep_link.to_string(),
        ));
        let key = (address.to_string(), package.to_string());
        if self.failing_launch.lock().unwrap().contains(&key) {
            return false;
        }
        self.running.lock().unwrap().insert(key);
        true
    }
}

// ============================================================================
// Control Plane
// ============================================================================

/// Scripted control plane. `listing: None` answers every listing with
/// `Unreachable`.
pub struct FakeControlPlane {
    pub listing: Option<Vec<DeviceStatus>>,
    pub panic_on_list: bool,
    pub hang_listing: bool,
    pub accept_restart: bool,
    pub restart_requests: Mutex<Vec<String>>,
    pub list_calls: AtomicUsize,
}

impl FakeControlPlane {
    pub fn with_listing(listing: Vec<DeviceStatus>) -> Arc<Self> {
        Arc::new(Self {
            listing: Some(listing),
            panic_on_list: false,
            hang_listing: false,
            accept_restart: true,
            restart_requests: Mutex::new(Vec::new()),
            list_calls: AtomicUsize::new(0),
        })
    }

    pub fn unreachable() -> Arc<Self> {
        Arc::new(Self {
            listing: None,
            panic_on_list: false,
            hang_listing: false,
            accept_restart: false,
            restart_requests: Mutex::new(Vec::new()),
            list_calls: AtomicUsize::new(0),
        })
    }

    pub fn panicking() -> Arc<Self> {
        Arc::new(Self {
            listing: None,
            panic_on_list: true,
            hang_listing: false,
            accept_restart: false,
            restart_requests: Mutex::new(Vec::new()),
            list_calls: AtomicUsize::new(0),
        })
    }

    /// Listing never answers.
    pub fn hanging() -> Arc<Self> {
        Arc::new(Self {
            listing: None,
            panic_on_list: false,
            hang_listing: true,
            accept_restart: false,
            restart_requests: Mutex::new(Vec::new()),
            list_calls: AtomicUsize::new(0),
        })
    }

    pub fn restarts(&self) -> Vec<String> {
        self.restart_requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ControlPlane for FakeControlPlane {
    async fn list_devices(
        &self,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<DeviceStatus>, ControlPlaneError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        assert!(!self.panic_on_list, "control plane exploded");
        if self.hang_listing {
            std::future::pending::<()>().await;
        }
        let Some(ref listing) = self.listing else {
            return Err(ControlPlaneError::Unreachable("connection refused".to_string()));
        };
        let start = ((page - 1) * page_size) as usize;
        Ok(listing
            .iter()
            .skip(start)
            .take(page_size as usize)
            .cloned()
            .collect())
    }

    async fn device_detail(&self, _device_id: &str) -> Result<Value, ControlPlaneError> {
        Ok(Value::Null)
    }

    async fn request_restart(&self, device_id: &str) -> Result<bool, ControlPlaneError> {
        self.restart_requests
            .lock()
            .unwrap()
            .push(device_id.to_string());
        Ok(self.accept_restart)
    }
}

pub fn status(id: &str, online: bool) -> DeviceStatus {
    DeviceStatus {
        device_id: Some(id.to_string()),
        name: None,
        online: Some(online),
        address: None,
    }
}

// ============================================================================
// Notifier
// ============================================================================

/// Records delivered ticks; optionally panics on every delivery.
#[derive(Default)]
pub struct FakeNotifier {
    panics: bool,
    delivered: Mutex<Vec<(u64, usize)>>,
}

impl FakeNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn panicking() -> Arc<Self> {
        Arc::new(Self {
            panics: true,
            ..Self::default()
        })
    }

    /// `(tick, event count)` per delivery.
    pub fn delivered(&self) -> Vec<(u64, usize)> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl TickNotifier for FakeNotifier {
    async fn notify_tick(&self, tick: u64, events: &[RecoveryAttempt]) -> Result<bool, NotifyError> {
        assert!(!self.panics, "notifier exploded");
        self.delivered.lock().unwrap().push((tick, events.len()));
        Ok(true)
    }
}

// ============================================================================
// Builders
// ============================================================================

pub fn app(package: &str) -> AppTarget {
    AppTarget {
        package: package.to_string(),
        launch_reference: SHARE_CODE.to_string(),
        display_name: "Game".to_string(),
    }
}

pub fn device(id: &str, address: &str, packages: &[&str]) -> Device {
    Device {
        device_id: id.to_string(),
        display_name: format!("{id}-name"),
        address: address.to_string(),
        apps: packages.iter().map(|p| app(p)).collect(),
    }
}

pub fn account(name: &str, devices: Vec<Device>) -> Account {
    Account {
        name: name.to_string(),
        credential: Credential::new(format!("AK{name}"), format!("SK{name}")),
        devices,
    }
}

pub fn recovery_settings(max_restarts: u32) -> RecoverySettings {
    RecoverySettings {
        restart_delay: Duration::from_secs(defaults::RESTART_DELAY_SECS),
        max_restarts_per_device: max_restarts,
        deep_link_template: defaults::DEEP_LINK_TEMPLATE.to_string(),
    }
}

pub fn scheduler_settings(policy: OfflinePolicy, restart_offline: bool) -> SchedulerSettings {
    SchedulerSettings {
        check_interval: Duration::from_secs(defaults::CHECK_INTERVAL_SECS),
        error_cooldown: Duration::from_secs(defaults::ERROR_COOLDOWN_SECS),
        max_concurrent_accounts: defaults::MAX_CONCURRENT_ACCOUNTS,
        offline_policy: policy,
        restart_offline_devices: restart_offline,
        listing_timeout: Duration::from_secs(defaults::API_TIMEOUT_SECS),
        page_size: 2,
        max_pages: 5,
    }
}

pub fn context(
    accounts: Vec<(Account, Arc<dyn ControlPlane>)>,
    agent: Arc<dyn DeviceAgent>,
    settings: SchedulerSettings,
    stats_store: StatsStore,
) -> AppContext {
    AppContext {
        accounts: accounts
            .into_iter()
            .map(|(account, control_plane)| AccountRuntime {
                account,
                control_plane,
            })
            .collect(),
        engine: RecoveryEngine::new(agent, recovery_settings(3)),
        settings,
        stats_store,
        notifier: None,
        cancel: CancellationToken::new(),
    }
}

pub fn expected_link() -> String {
    defaults::DEEP_LINK_TEMPLATE.replace("{code}", SHARE_CODE)
}
