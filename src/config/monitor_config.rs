//! Monitor Configuration - accounts, devices, apps and loop tuning
//!
//! The document is JSON or TOML (chosen by file extension). Every key is
//! camelCase, its snake_case spelling is accepted too, and the field names of
//! the old single-device scripts (`api_key`, `device_ip`, `roblox_url`, ...)
//! are accepted as aliases so existing configs keep working.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::defaults;
use super::validation::{self, ValidationWarning};
use crate::signing::SigningProfile;
use crate::types::{Account, AppTarget, Credential, Device};

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration of the supervisor.
///
/// Load with [`MonitorConfig::load`] which searches:
/// 1. an explicit path (`--config`)
/// 2. `$VSPHONE_GUARDIAN_CONFIG`
/// 3. `./config.json`, then `./config.toml`
///
/// There are no built-in accounts, so a missing file is an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorConfig {
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,

    #[serde(default)]
    pub monitoring: MonitoringConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub adb: AdbConfig,
}

/// File format of a config document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Toml,
}

impl ConfigFormat {
    /// `.toml` files are TOML, everything else is JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Self::Toml,
            _ => Self::Json,
        }
    }
}

impl MonitorConfig {
    /// Resolve the config path and load it.
    pub fn load(explicit: Option<&Path>) -> Result<(Self, PathBuf), ConfigError> {
        let path = Self::locate(explicit)?;
        let config = Self::load_from_file(&path)?;
        info!(
            path = %path.display(),
            accounts = config.accounts.len(),
            devices = config.device_count(),
            "Loaded monitor config"
        );
        Ok((config, path))
    }

    /// Find the config file using the standard search order.
    pub fn locate(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(path.to_path_buf());
            }
            return Err(ConfigError::NotFound(vec![path.to_path_buf()]));
        }

        let mut searched = Vec::new();

        if let Ok(env_path) = std::env::var(defaults::CONFIG_ENV_VAR) {
            let p = PathBuf::from(&env_path);
            if p.exists() {
                return Ok(p);
            }
            warn!(path = %env_path, "{} points to non-existent file", defaults::CONFIG_ENV_VAR);
            searched.push(p);
        }

        for candidate in defaults::CONFIG_SEARCH_PATHS {
            let p = PathBuf::from(candidate);
            if p.exists() {
                return Ok(p);
            }
            searched.push(p);
        }

        Err(ConfigError::NotFound(searched))
    }

    /// Load from a specific file path. Unknown keys are logged as warnings.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let (config, warnings) = Self::parse(&contents, ConfigFormat::from_path(path), path)?;
        for w in &warnings {
            warn!("{}", w);
        }
        Ok(config)
    }

    /// Parse and validate a document.
    ///
    /// Two-pass: the document is read into a generic value and checked for
    /// unknown keys (warnings only), then deserialized and validated.
    pub fn parse(
        contents: &str,
        format: ConfigFormat,
        origin: &Path,
    ) -> Result<(Self, Vec<ValidationWarning>), ConfigError> {
        let parse_err = |msg: String| ConfigError::Parse(origin.to_path_buf(), msg);

        let document: serde_json::Value = match format {
            ConfigFormat::Json => serde_json::from_str(contents).map_err(|e| parse_err(e.to_string()))?,
            ConfigFormat::Toml => toml::from_str(contents).map_err(|e| parse_err(e.to_string()))?,
        };

        let warnings = validation::validate_unknown_keys(&document);

        let config: Self = serde_json::from_value(document).map_err(|e| parse_err(e.to_string()))?;
        config.validate()?;
        Ok((config, warnings))
    }

    /// Check the whole document and report every problem at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        if self.accounts.is_empty() {
            errors.push("accounts: at least one account is required".to_string());
        }

        let mut account_names = HashSet::new();
        for (ai, account) in self.accounts.iter().enumerate() {
            let at = format!("accounts[{ai}]");
            if account.name.trim().is_empty() {
                errors.push(format!("{at}.name must not be empty"));
            } else if !account_names.insert(account.name.trim()) {
                errors.push(format!("{at}.name '{}' is used by more than one account", account.name));
            }
            if account.access_key.trim().is_empty() {
                errors.push(format!("{at}.accessKey must not be empty"));
            }
            if account.secret_key.trim().is_empty() {
                errors.push(format!("{at}.secretKey must not be empty"));
            }
            if account.devices.is_empty() {
                errors.push(format!("{at}.devices: at least one device is required"));
            }

            let mut device_ids = HashSet::new();
            for (di, device) in account.devices.iter().enumerate() {
                let dt = format!("{at}.devices[{di}]");
                let id = device.effective_id();
                if id.is_empty() {
                    errors.push(format!("{dt}: deviceId or deviceName is required"));
                } else if !device_ids.insert(id) {
                    errors.push(format!("{dt}.deviceId '{id}' is configured twice in this account"));
                }
                let address = device.device_address.trim();
                if address.is_empty() {
                    errors.push(format!("{dt}.deviceAddress must not be empty"));
                } else if is_unbracketed_ipv6(address) {
                    errors.push(format!(
                        "{dt}.deviceAddress '{address}': IPv6 literals must be bracketed, e.g. '[{address}]'"
                    ));
                }
                if device.apps.is_empty() {
                    errors.push(format!("{dt}.apps: at least one app is required"));
                }
                let mut packages = HashSet::new();
                for (pi, app) in device.apps.iter().enumerate() {
                    let pt = format!("{dt}.apps[{pi}]");
                    let package = app.package_identifier.trim();
                    if package.is_empty() {
                        errors.push(format!("{pt}.packageIdentifier must not be empty"));
                    } else if package.chars().any(char::is_whitespace) {
                        errors.push(format!("{pt}.packageIdentifier must not contain whitespace"));
                    } else if !packages.insert(package) {
                        errors.push(format!(
                            "{pt}.packageIdentifier '{package}' is configured twice on this device"
                        ));
                    }
                    if app.launch_reference.trim().is_empty() {
                        errors.push(format!("{pt}.launchReference must not be empty"));
                    }
                }
            }
        }

        let m = &self.monitoring;
        if m.check_interval_seconds == 0 {
            errors.push("monitoring.checkIntervalSeconds must be > 0".to_string());
        }
        if m.max_restart_attempts == 0 {
            errors.push("monitoring.maxRestartAttempts must be > 0".to_string());
        }
        if m.max_concurrent_accounts == 0 {
            errors.push("monitoring.maxConcurrentAccounts must be > 0".to_string());
        }
        if !m.deep_link_template.contains(defaults::DEEP_LINK_CODE_PLACEHOLDER) {
            errors.push(format!(
                "monitoring.deepLinkTemplate must contain the '{}' placeholder",
                defaults::DEEP_LINK_CODE_PLACEHOLDER
            ));
        }
        if !crate::recovery::has_uri_scheme(&m.deep_link_template) {
            errors.push("monitoring.deepLinkTemplate must start with a URI scheme".to_string());
        }
        if let Some(url) = m.webhook() {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                errors.push(format!("monitoring.webhookUrl '{url}' must be an http(s) URL"));
            }
        }

        let a = &self.api;
        if a.timeout_seconds == 0 {
            errors.push("api.timeoutSeconds must be > 0".to_string());
        }
        if a.page_size == 0 {
            errors.push("api.pageSize must be > 0".to_string());
        }
        if a.max_pages == 0 {
            errors.push("api.maxPages must be > 0".to_string());
        }
        if a.success_codes.is_empty() {
            errors.push("api.successCodes must not be empty".to_string());
        }
        if !matches!(a.method.to_ascii_uppercase().as_str(), "GET" | "POST") {
            errors.push(format!("api.method must be GET or POST, got '{}'", a.method));
        }
        for (key, path) in [
            ("listPath", &a.list_path),
            ("detailPath", &a.detail_path),
            ("restartPath", &a.restart_path),
        ] {
            if !path.starts_with('/') {
                errors.push(format!("api.{key} '{path}' must start with '/'"));
            }
        }
        if let Some(ref base) = a.base_url {
            if !(base.starts_with("http://") || base.starts_with("https://")) {
                errors.push(format!("api.baseUrl '{base}' must be an http(s) URL"));
            }
        }

        if self.adb.binary.trim().is_empty() {
            errors.push("adb.binary must not be empty".to_string());
        }
        if self.adb.default_port == 0 {
            errors.push("adb.defaultPort must be > 0".to_string());
        }
        if self.adb.command_timeout_seconds == 0 {
            errors.push("adb.commandTimeoutSeconds must be > 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    pub fn device_count(&self) -> usize {
        self.accounts.iter().map(|a| a.devices.len()).sum()
    }

    /// Build the immutable account → device → app tree used at runtime.
    pub fn to_accounts(&self) -> Vec<Account> {
        self.accounts
            .iter()
            .map(|account| Account {
                name: account.name.trim().to_string(),
                credential: Credential::new(account.access_key.trim(), account.secret_key.trim()),
                devices: account
                    .devices
                    .iter()
                    .map(|d| d.to_device(self.adb.default_port))
                    .collect(),
            })
            .collect()
    }
}

// ============================================================================
// Accounts / Devices / Apps
// ============================================================================

/// One control-plane account.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountConfig {
    #[serde(default)]
    pub name: String,

    #[serde(default, alias = "access_key", alias = "api_key")]
    pub access_key: String,

    #[serde(default, alias = "secret_key", alias = "api_secret")]
    pub secret_key: String,

    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

/// One cloud phone.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceConfig {
    /// Control-plane identifier (pad code).
    #[serde(default, alias = "device_id")]
    pub device_id: String,

    #[serde(default, alias = "device_name")]
    pub device_name: String,

    /// `host` or `host:port` of the device-control channel.
    #[serde(
        default,
        alias = "device_address",
        alias = "deviceIp",
        alias = "device_ip"
    )]
    pub device_address: String,

    #[serde(default)]
    pub apps: Vec<AppConfig>,
}

impl DeviceConfig {
    /// Identifier used for lookups and stats: the id, else the name.
    pub fn effective_id(&self) -> &str {
        let id = self.device_id.trim();
        if id.is_empty() {
            self.device_name.trim()
        } else {
            id
        }
    }

    fn to_device(&self, default_port: u16) -> Device {
        let id = self.effective_id().to_string();
        let name = self.device_name.trim();
        Device {
            display_name: if name.is_empty() { id.clone() } else { name.to_string() },
            device_id: id,
            address: with_default_port(self.device_address.trim(), default_port),
            apps: self.apps.iter().map(AppConfig::to_target).collect(),
        }
    }
}

/// One app that must stay running.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default, alias = "package_identifier", alias = "package")]
    pub package_identifier: String,

    /// Deep link or bare share code.
    #[serde(
        default,
        alias = "launch_reference",
        alias = "robloxUrl",
        alias = "roblox_url",
        alias = "shareCode",
        alias = "share_code"
    )]
    pub launch_reference: String,

    #[serde(
        default,
        alias = "display_name",
        alias = "gameName",
        alias = "game_name"
    )]
    pub display_name: String,
}

impl AppConfig {
    fn to_target(&self) -> AppTarget {
        let package = self.package_identifier.trim().to_string();
        let name = self.display_name.trim();
        AppTarget {
            display_name: if name.is_empty() { package.clone() } else { name.to_string() },
            launch_reference: self.launch_reference.trim().to_string(),
            package,
        }
    }
}

/// More than one `:` outside brackets: a bare IPv6 literal, ambiguous with `host:port`.
fn is_unbracketed_ipv6(address: &str) -> bool {
    !address.starts_with('[') && address.matches(':').count() > 1
}

/// Append the default port to a bare host. Bracketed IPv6 literals are handled.
pub fn with_default_port(address: &str, default_port: u16) -> String {
    let has_port = if let Some(rest) = address.strip_prefix('[') {
        rest.contains("]:")
    } else {
        address.contains(':')
    };
    if has_port || address.is_empty() {
        address.to_string()
    } else {
        format!("{address}:{default_port}")
    }
}

// ============================================================================
// Monitoring Loop
// ============================================================================

/// What to do with devices the control plane reports offline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfflinePolicy {
    /// Skip the device for this tick.
    #[default]
    Skip,
    /// Use the device-control channel regardless.
    #[serde(alias = "checkAnyway")]
    CheckAnyway,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringConfig {
    #[serde(
        default = "default_check_interval",
        alias = "check_interval_seconds",
        alias = "check_interval"
    )]
    pub check_interval_seconds: u64,

    #[serde(
        default = "default_restart_delay",
        alias = "restart_delay_seconds",
        alias = "restart_delay"
    )]
    pub restart_delay_seconds: u64,

    /// Restart cycles per device per tick.
    #[serde(default = "default_max_restart_attempts", alias = "max_restart_attempts")]
    pub max_restart_attempts: u32,

    #[serde(default, alias = "webhook_url")]
    pub webhook_url: Option<String>,

    #[serde(default = "default_error_cooldown", alias = "error_cooldown_seconds")]
    pub error_cooldown_seconds: u64,

    #[serde(default = "default_max_concurrent_accounts", alias = "max_concurrent_accounts")]
    pub max_concurrent_accounts: usize,

    #[serde(default, alias = "offline_policy")]
    pub offline_policy: OfflinePolicy,

    /// Ask the control plane to reboot devices it reports offline.
    #[serde(default, alias = "restart_offline_devices")]
    pub restart_offline_devices: bool,

    #[serde(default = "default_deep_link_template", alias = "deep_link_template")]
    pub deep_link_template: String,
}

fn default_check_interval() -> u64 {
    defaults::CHECK_INTERVAL_SECS
}
fn default_restart_delay() -> u64 {
    defaults::RESTART_DELAY_SECS
}
fn default_max_restart_attempts() -> u32 {
    defaults::MAX_RESTART_ATTEMPTS
}
fn default_error_cooldown() -> u64 {
    defaults::ERROR_COOLDOWN_SECS
}
fn default_max_concurrent_accounts() -> usize {
    defaults::MAX_CONCURRENT_ACCOUNTS
}
fn default_deep_link_template() -> String {
    defaults::DEEP_LINK_TEMPLATE.to_string()
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            check_interval_seconds: default_check_interval(),
            restart_delay_seconds: default_restart_delay(),
            max_restart_attempts: default_max_restart_attempts(),
            webhook_url: None,
            error_cooldown_seconds: default_error_cooldown(),
            max_concurrent_accounts: default_max_concurrent_accounts(),
            offline_policy: OfflinePolicy::default(),
            restart_offline_devices: false,
            deep_link_template: default_deep_link_template(),
        }
    }
}

impl MonitoringConfig {
    /// Webhook URL, treating an empty string as unset.
    pub fn webhook(&self) -> Option<&str> {
        self.webhook_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
    }
}

// ============================================================================
// Control-Plane API
// ============================================================================

/// Named signing variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiProfile {
    #[default]
    #[serde(alias = "armcloud-paas")]
    ArmcloudPaas,
    #[serde(alias = "vsphone-sdk")]
    VsphoneSdk,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiConfig {
    #[serde(default)]
    pub profile: ApiProfile,

    /// Defaults to `https://<host>`.
    #[serde(default, alias = "base_url")]
    pub base_url: Option<String>,

    // Signing overrides; unset fields come from the profile.
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default, alias = "content_type")]
    pub content_type: Option<String>,
    #[serde(default)]
    pub algorithm: Option<String>,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default, alias = "scope_terminator")]
    pub scope_terminator: Option<String>,
    #[serde(default, alias = "secret_prefix")]
    pub secret_prefix: Option<String>,

    #[serde(default = "default_api_timeout", alias = "timeout_seconds")]
    pub timeout_seconds: u64,

    #[serde(default = "default_list_path", alias = "list_path")]
    pub list_path: String,

    #[serde(default = "default_detail_path", alias = "detail_path")]
    pub detail_path: String,

    #[serde(default = "default_restart_path", alias = "restart_path")]
    pub restart_path: String,

    /// Preferred verb; the other one is tried once on HTTP 405.
    #[serde(default = "default_method")]
    pub method: String,

    #[serde(default = "default_page_size", alias = "page_size")]
    pub page_size: u32,

    #[serde(default = "default_max_pages", alias = "max_pages")]
    pub max_pages: u32,

    #[serde(default = "default_success_codes", alias = "success_codes")]
    pub success_codes: Vec<i64>,
}

fn default_api_timeout() -> u64 {
    defaults::API_TIMEOUT_SECS
}
fn default_list_path() -> String {
    defaults::API_LIST_PATH.to_string()
}
fn default_detail_path() -> String {
    defaults::API_DETAIL_PATH.to_string()
}
fn default_restart_path() -> String {
    defaults::API_RESTART_PATH.to_string()
}
fn default_method() -> String {
    "POST".to_string()
}
fn default_page_size() -> u32 {
    defaults::API_PAGE_SIZE
}
fn default_max_pages() -> u32 {
    defaults::API_MAX_PAGES
}
fn default_success_codes() -> Vec<i64> {
    defaults::API_SUCCESS_CODES.to_vec()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            profile: ApiProfile::default(),
            base_url: None,
            host: None,
            content_type: None,
            algorithm: None,
            service: None,
            scope_terminator: None,
            secret_prefix: None,
            timeout_seconds: default_api_timeout(),
            list_path: default_list_path(),
            detail_path: default_detail_path(),
            restart_path: default_restart_path(),
            method: default_method(),
            page_size: default_page_size(),
            max_pages: default_max_pages(),
            success_codes: default_success_codes(),
        }
    }
}

impl ApiConfig {
    /// The named profile with any per-field overrides applied.
    pub fn signing_profile(&self) -> SigningProfile {
        let mut profile = match self.profile {
            ApiProfile::ArmcloudPaas => SigningProfile::armcloud_paas(),
            ApiProfile::VsphoneSdk => SigningProfile::vsphone_sdk(),
        };
        if let Some(ref v) = self.host {
            profile.host.clone_from(v);
        }
        if let Some(ref v) = self.content_type {
            profile.content_type.clone_from(v);
        }
        if let Some(ref v) = self.algorithm {
            profile.algorithm.clone_from(v);
        }
        if let Some(ref v) = self.service {
            profile.service.clone_from(v);
        }
        if let Some(ref v) = self.scope_terminator {
            profile.scope_terminator.clone_from(v);
        }
        if let Some(ref v) = self.secret_prefix {
            profile.secret_prefix.clone_from(v);
        }
        profile
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> String {
        let url = self.base_url.clone().unwrap_or_else(|| {
            let host = self.host.as_deref().unwrap_or(defaults::API_HOST);
            format!("https://{host}")
        });
        url.trim_end_matches('/').to_string()
    }

    pub fn prefers_get(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET")
    }
}

// ============================================================================
// Device-Control Channel
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdbConfig {
    #[serde(default = "default_adb_binary")]
    pub binary: String,

    #[serde(default = "default_adb_port", alias = "default_port")]
    pub default_port: u16,

    #[serde(default = "default_adb_timeout", alias = "command_timeout_seconds")]
    pub command_timeout_seconds: u64,
}

fn default_adb_binary() -> String {
    defaults::ADB_BINARY.to_string()
}
fn default_adb_port() -> u16 {
    defaults::ADB_DEFAULT_PORT
}
fn default_adb_timeout() -> u64 {
    defaults::ADB_COMMAND_TIMEOUT_SECS
}

impl Default for AdbConfig {
    fn default() -> Self {
        Self {
            binary: default_adb_binary(),
            default_port: default_adb_port(),
            command_timeout_seconds: default_adb_timeout(),
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    NotFound(Vec<PathBuf>),
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, String),
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(searched) => {
                write!(f, "No config file found (searched:")?;
                for p in searched {
                    write!(f, " {}", p.display())?;
                }
                write!(f, ")")
            }
            Self::Io(path, e) => write!(f, "Config I/O error ({}): {}", path.display(), e),
            Self::Parse(path, e) => write!(f, "Config parse error ({}): {}", path.display(), e),
            Self::Validation(errors) => {
                writeln!(f, "Config validation failed:")?;
                for e in errors {
                    writeln!(f, "  - {e}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_json(doc: &str) -> Result<MonitorConfig, ConfigError> {
        MonitorConfig::parse(doc, ConfigFormat::Json, Path::new("test.json")).map(|(c, _)| c)
    }

    const MINIMAL: &str = r#"{
        "accounts": [{
            "name": "main", "accessKey": "AK", "secretKey": "SK",
            "devices": [{
                "deviceId": "AC2201", "deviceAddress": "10.0.0.5",
                "apps": [{"packageIdentifier": "com.roblox.client", "launchReference": "abc123"}]
            }]
        }]
    }"#;

    #[test]
    fn test_minimal_document_gets_defaults() {
        let config = parse_json(MINIMAL).unwrap();
        assert_eq!(config.monitoring.check_interval_seconds, 30);
        assert_eq!(config.monitoring.restart_delay_seconds, 5);
        assert_eq!(config.monitoring.max_restart_attempts, 3);
        assert_eq!(config.monitoring.offline_policy, OfflinePolicy::Skip);
        assert_eq!(config.api.profile, ApiProfile::ArmcloudPaas);
        assert_eq!(config.api.success_codes, vec![0, 200]);
        assert!(config.monitoring.webhook().is_none());
    }

    #[test]
    fn test_to_accounts_fills_fallbacks() {
        let config = parse_json(MINIMAL).unwrap();
        let accounts = config.to_accounts();
        let device = &accounts[0].devices[0];
        assert_eq!(device.address, "10.0.0.5:5555");
        assert_eq!(device.display_name, "AC2201");
        assert_eq!(device.apps[0].display_name, "com.roblox.client");
    }

    #[test]
    fn test_legacy_field_names() {
        let doc = r#"{
            "accounts": [{
                "name": "legacy", "api_key": "AK", "api_secret": "SK",
                "devices": [{
                    "device_name": "phone-1", "device_ip": "10.0.0.9:5556",
                    "apps": [{"package": "com.roblox.client", "roblox_url": "https://x/?code=1", "game_name": "G"}]
                }]
            }],
            "monitoring": {"check_interval": 60, "restart_delay": 2, "webhook_url": ""}
        }"#;
        let config = parse_json(doc).unwrap();
        assert_eq!(config.monitoring.check_interval_seconds, 60);
        assert_eq!(config.monitoring.restart_delay_seconds, 2);
        assert!(config.monitoring.webhook().is_none());

        let accounts = config.to_accounts();
        assert_eq!(accounts[0].credential.access_key, "AK");
        let device = &accounts[0].devices[0];
        assert_eq!(device.device_id, "phone-1");
        assert_eq!(device.address, "10.0.0.9:5556");
        assert_eq!(device.apps[0].display_name, "G");
    }

    #[test]
    fn test_validation_collects_every_error() {
        let doc = r#"{
            "accounts": [{"name": "", "devices": [{"apps": [{}]}]}],
            "monitoring": {"checkIntervalSeconds": 0}
        }"#;
        match parse_json(doc) {
            Err(ConfigError::Validation(errors)) => {
                let all = errors.join("\n");
                assert!(all.contains("accounts[0].name"));
                assert!(all.contains("accessKey"));
                assert!(all.contains("secretKey"));
                assert!(all.contains("deviceId or deviceName"));
                assert!(all.contains("deviceAddress"));
                assert!(all.contains("packageIdentifier"));
                assert!(all.contains("launchReference"));
                assert!(all.contains("checkIntervalSeconds"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_account_names_rejected() {
        let account = r#"{"name": "a", "accessKey": "k", "secretKey": "s",
            "devices": [{"deviceId": "d", "deviceAddress": "h", "apps": [{"package": "p", "shareCode": "c"}]}]}"#;
        let doc = format!(r#"{{"accounts": [{account}, {account}]}}"#);
        assert!(matches!(parse_json(&doc), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_duplicate_package_on_one_device_rejected() {
        let doc = r#"{"accounts": [{"name": "a", "accessKey": "k", "secretKey": "s",
            "devices": [{"deviceId": "d", "deviceAddress": "h", "apps": [
                {"packageIdentifier": "com.roblox.client", "launchReference": "aaa"},
                {"packageIdentifier": " com.roblox.client", "launchReference": "bbb"}
            ]}]}]}"#;
        match parse_json(doc) {
            Err(ConfigError::Validation(errors)) => {
                assert_eq!(errors.len(), 1, "{errors:?}");
                assert!(errors[0].contains("apps[1].packageIdentifier"));
                assert!(errors[0].contains("configured twice"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_same_package_on_two_devices_allowed() {
        let doc = r#"{"accounts": [{"name": "a", "accessKey": "k", "secretKey": "s",
            "devices": [
                {"deviceId": "d1", "deviceAddress": "h1", "apps": [{"package": "p", "shareCode": "c"}]},
                {"deviceId": "d2", "deviceAddress": "h2", "apps": [{"package": "p", "shareCode": "c"}]}
            ]}]}"#;
        assert!(parse_json(doc).is_ok());
    }

    #[test]
    fn test_unbracketed_ipv6_address_rejected() {
        let doc = MINIMAL.replace("10.0.0.5", "fe80::1");
        match parse_json(&doc) {
            Err(ConfigError::Validation(errors)) => {
                assert_eq!(errors.len(), 1, "{errors:?}");
                assert!(errors[0].contains("[fe80::1]"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }

        let bracketed = MINIMAL.replace("10.0.0.5", "[fe80::1]");
        let config = parse_json(&bracketed).unwrap();
        assert_eq!(config.to_accounts()[0].devices[0].address, "[fe80::1]:5555");
    }

    #[test]
    fn test_toml_document() {
        let doc = r#"
[[accounts]]
name = "main"
access_key = "AK"
secret_key = "SK"

[[accounts.devices]]
device_id = "AC1"
device_address = "10.0.0.1"

[[accounts.devices.apps]]
package = "com.roblox.client"
share_code = "xyz"

[monitoring]
offline_policy = "check_anyway"

[api]
profile = "vsphone_sdk"
"#;
        let (config, warnings) =
            MonitorConfig::parse(doc, ConfigFormat::Toml, Path::new("config.toml")).unwrap();
        assert!(warnings.is_empty());
        assert_eq!(config.monitoring.offline_policy, OfflinePolicy::CheckAnyway);
        assert_eq!(config.api.signing_profile().service, "vsphone");
    }

    #[test]
    fn test_signing_overrides_apply() {
        let api = ApiConfig {
            host: Some("api.example.test".to_string()),
            service: Some("custom".to_string()),
            ..ApiConfig::default()
        };
        let profile = api.signing_profile();
        assert_eq!(profile.host, "api.example.test");
        assert_eq!(profile.service, "custom");
        assert_eq!(profile.algorithm, "HMAC-SHA256");
        assert_eq!(api.base_url(), "https://api.example.test");
    }

    #[test]
    fn test_with_default_port() {
        assert_eq!(with_default_port("10.0.0.1", 5555), "10.0.0.1:5555");
        assert_eq!(with_default_port("10.0.0.1:7000", 5555), "10.0.0.1:7000");
        assert_eq!(with_default_port("[::1]", 5555), "[::1]:5555");
        assert_eq!(with_default_port("[::1]:7000", 5555), "[::1]:7000");
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(ConfigFormat::from_path(Path::new("a.toml")), ConfigFormat::Toml);
        assert_eq!(ConfigFormat::from_path(Path::new("a.json")), ConfigFormat::Json);
        assert_eq!(ConfigFormat::from_path(Path::new("config")), ConfigFormat::Json);
    }
}
