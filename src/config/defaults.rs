//! System-wide default constants.
//!
//! Centralises the magic numbers of the supervisor. Grouped by subsystem for
//! easy discovery. Every value here can be overridden from the config file
//! unless noted otherwise.

// ============================================================================
// Monitoring Loop
// ============================================================================

/// Interval between two ticks (seconds).
pub const CHECK_INTERVAL_SECS: u64 = 30;

/// Pause between force-stop and launch during a restart (seconds).
pub const RESTART_DELAY_SECS: u64 = 5;

/// Restart cycles allowed per device per tick.
pub const MAX_RESTART_ATTEMPTS: u32 = 3;

/// Cool-down after an unexpected error inside a tick (seconds).
pub const ERROR_COOLDOWN_SECS: u64 = 10;

/// Upper bound on accounts evaluated in parallel.
pub const MAX_CONCURRENT_ACCOUNTS: usize = 4;

/// Deep-link template used to wrap bare share codes. `{code}` is replaced.
pub const DEEP_LINK_TEMPLATE: &str = "https://www.roblox.com/share?code={code}&type=Server";

/// Placeholder substituted in [`DEEP_LINK_TEMPLATE`].
pub const DEEP_LINK_CODE_PLACEHOLDER: &str = "{code}";

// ============================================================================
// Control-Plane API
// ============================================================================

/// Control-plane host, also signed as the `host` header.
pub const API_HOST: &str = "api.vsphone.com";

/// Per-request timeout for control-plane calls (seconds).
pub const API_TIMEOUT_SECS: u64 = 15;

/// Device listing endpoint.
pub const API_LIST_PATH: &str = "/vsphone/api/padApi/userPadList";

/// Device detail endpoint.
pub const API_DETAIL_PATH: &str = "/vsphone/api/padApi/padInfo";

/// Device restart endpoint.
pub const API_RESTART_PATH: &str = "/vsphone/api/padApi/restart";

/// Page size used when listing devices.
pub const API_PAGE_SIZE: u32 = 100;

/// Hard stop for device-list pagination.
pub const API_MAX_PAGES: u32 = 20;

/// Application-level `code` values that mean success. Both have been observed.
pub const API_SUCCESS_CODES: &[i64] = &[0, 200];

/// Maximum tolerated difference between local and server clocks (seconds).
///
/// Not configurable: the remote service rejects signatures outside this window.
pub const MAX_CLOCK_SKEW_SECS: i64 = 300;

// ============================================================================
// Device-Control Channel (ADB)
// ============================================================================

/// Binary used for the device-control channel.
pub const ADB_BINARY: &str = "adb";

/// Port appended to bare device hosts.
pub const ADB_DEFAULT_PORT: u16 = 5555;

/// Timeout for a single device-control command (seconds).
pub const ADB_COMMAND_TIMEOUT_SECS: u64 = 15;

// ============================================================================
// Notifications
// ============================================================================

/// Timeout for webhook deliveries (seconds).
pub const WEBHOOK_TIMEOUT_SECS: u64 = 10;

// ============================================================================
// Files
// ============================================================================

/// Environment variable naming the config file.
pub const CONFIG_ENV_VAR: &str = "VSPHONE_GUARDIAN_CONFIG";

/// Config files probed in the working directory, in order.
pub const CONFIG_SEARCH_PATHS: &[&str] = &["config.json", "config.toml"];

/// Default data directory (stats file, lock file).
pub const DATA_DIR: &str = "./data";

/// Stats file name inside the data directory.
pub const STATS_FILE_NAME: &str = "stats.json";

/// Default log directory.
pub const LOG_DIR: &str = "logs";

/// Log file name prefix inside the log directory.
pub const LOG_FILE_NAME: &str = "monitor.log";
