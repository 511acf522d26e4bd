//! Config validation: unknown-key detection with Levenshtein suggestions.
//!
//! Two-pass parse approach: the raw document is first read into a generic
//! `serde_json::Value` (TOML documents are converted on the way in), the key
//! tree is walked and compared against the known field names, and warnings
//! with "did you mean?" suggestions are emitted. Then normal serde
//! deserialization runs. Warnings never break existing configs.
//!
//! Array elements are walked with a `[]` marker, so a typo inside the second
//! device of the first account surfaces as `accounts[].devices[].devceId`.

use std::collections::HashSet;

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " — did you mean '{s}'?")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

const ACCOUNT_KEYS: &[&str] = &[
    "name",
    "accessKey",
    "access_key",
    "api_key",
    "secretKey",
    "secret_key",
    "api_secret",
    "devices",
];

const DEVICE_KEYS: &[&str] = &[
    "deviceId",
    "device_id",
    "deviceName",
    "device_name",
    "deviceAddress",
    "device_address",
    "deviceIp",
    "device_ip",
    "apps",
];

const APP_KEYS: &[&str] = &[
    "packageIdentifier",
    "package_identifier",
    "package",
    "launchReference",
    "launch_reference",
    "robloxUrl",
    "roblox_url",
    "shareCode",
    "share_code",
    "displayName",
    "display_name",
    "gameName",
    "game_name",
];

const MONITORING_KEYS: &[&str] = &[
    "checkIntervalSeconds",
    "check_interval_seconds",
    "check_interval",
    "restartDelaySeconds",
    "restart_delay_seconds",
    "restart_delay",
    "maxRestartAttempts",
    "max_restart_attempts",
    "webhookUrl",
    "webhook_url",
    "errorCooldownSeconds",
    "error_cooldown_seconds",
    "maxConcurrentAccounts",
    "max_concurrent_accounts",
    "offlinePolicy",
    "offline_policy",
    "restartOfflineDevices",
    "restart_offline_devices",
    "deepLinkTemplate",
    "deep_link_template",
];

const API_KEYS: &[&str] = &[
    "profile",
    "baseUrl",
    "base_url",
    "host",
    "contentType",
    "content_type",
    "algorithm",
    "service",
    "scopeTerminator",
    "scope_terminator",
    "secretPrefix",
    "secret_prefix",
    "timeoutSeconds",
    "timeout_seconds",
    "listPath",
    "list_path",
    "detailPath",
    "detail_path",
    "restartPath",
    "restart_path",
    "method",
    "pageSize",
    "page_size",
    "maxPages",
    "max_pages",
    "successCodes",
    "success_codes",
];

const ADB_KEYS: &[&str] = &[
    "binary",
    "defaultPort",
    "default_port",
    "commandTimeoutSeconds",
    "command_timeout_seconds",
];

/// Returns the complete set of valid dotted key paths for `MonitorConfig`.
///
/// Maintained manually to match the serde names and aliases in
/// `monitor_config.rs`. Any new field added there must be added here too.
pub fn known_config_keys() -> HashSet<String> {
    let mut keys: HashSet<String> = ["accounts", "monitoring", "api", "adb"]
        .iter()
        .map(|s| (*s).to_string())
        .collect();

    let sections: &[(&str, &[&str])] = &[
        ("accounts[]", ACCOUNT_KEYS),
        ("accounts[].devices[]", DEVICE_KEYS),
        ("accounts[].devices[].apps[]", APP_KEYS),
        ("monitoring", MONITORING_KEYS),
        ("api", API_KEYS),
        ("adb", ADB_KEYS),
    ];
    for (prefix, fields) in sections {
        for field in *fields {
            keys.insert(format!("{prefix}.{field}"));
        }
    }
    keys
}

// ============================================================================
// Key Walking
// ============================================================================

/// Recursively walks a JSON value tree and collects all dotted key paths.
///
/// For example `{ "a": { "b": 1 }, "c": [ { "d": 2 } ] }` yields
/// `["a", "a.b", "c", "c[].d"]`.
pub fn walk_keys(value: &serde_json::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    match value {
        serde_json::Value::Object(map) => {
            for (k, v) in map {
                let path = if prefix.is_empty() {
                    k.clone()
                } else {
                    format!("{prefix}.{k}")
                };
                keys.push(path.clone());
                keys.extend(walk_keys(v, &path));
            }
        }
        serde_json::Value::Array(items) => {
            let path = format!("{prefix}[]");
            for item in items {
                for key in walk_keys(item, &path) {
                    if !keys.contains(&key) {
                        keys.push(key);
                    }
                }
            }
        }
        _ => {}
    }
    keys
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

/// Compute the Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let b_len = b_chars.len();
    if a.is_empty() {
        return b_len;
    }
    if b_len == 0 {
        return a.chars().count();
    }

    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut curr = vec![0; b_len + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_len]
}

/// Suggest the closest known key for an unknown key, if within edit distance 3.
///
/// Ties resolve to the lexicographically smallest key so suggestions are stable.
pub fn suggest_correction(unknown: &str, known: &HashSet<String>) -> Option<String> {
    let mut best: Option<(&str, usize)> = None;
    for k in known {
        let dist = levenshtein(unknown, k);
        if dist > 3 {
            continue;
        }
        best = match best {
            Some((bk, bd)) if bd < dist || (bd == dist && bk <= k.as_str()) => Some((bk, bd)),
            _ => Some((k.as_str(), dist)),
        };
    }
    best.map(|(k, _)| k.to_string())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Return warnings for any unknown config keys in an already-parsed document.
///
/// This does NOT fail on unknown keys, it only warns.
pub fn validate_unknown_keys(document: &serde_json::Value) -> Vec<ValidationWarning> {
    let known = known_config_keys();
    walk_keys(document, "")
        .into_iter()
        .filter(|key| !known.contains(key))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_levenshtein_identical() {
        assert_eq!(levenshtein("deviceId", "deviceId"), 0);
    }

    #[test]
    fn test_levenshtein_one_edit() {
        assert_eq!(levenshtein("devceId", "deviceId"), 1);
        assert_eq!(levenshtein("name", "naem"), 2);
    }

    #[test]
    fn test_levenshtein_empty() {
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
    }

    #[test]
    fn test_walk_keys_descends_into_arrays() {
        let doc = json!({
            "accounts": [
                {"name": "a", "devices": [{"deviceId": "x", "apps": []}]},
                {"name": "b"}
            ]
        });
        let keys = walk_keys(&doc, "");
        assert!(keys.contains(&"accounts".to_string()));
        assert!(keys.contains(&"accounts[].name".to_string()));
        assert!(keys.contains(&"accounts[].devices[].deviceId".to_string()));
        // Keys repeated across array elements are reported once
        assert_eq!(
            keys.iter().filter(|k| *k == "accounts[].name").count(),
            1
        );
    }

    #[test]
    fn test_typo_in_device_key_suggests_fix() {
        let doc = json!({
            "accounts": [{"name": "a", "devices": [{"devceId": "x"}]}]
        });
        let warnings = validate_unknown_keys(&doc);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field, "accounts[].devices[].devceId");
        assert_eq!(
            warnings[0].suggestion.as_deref(),
            Some("accounts[].devices[].deviceId")
        );
    }

    #[test]
    fn test_legacy_keys_are_known() {
        let doc = json!({
            "accounts": [{
                "name": "a", "api_key": "k", "api_secret": "s",
                "devices": [{
                    "device_id": "x", "device_ip": "10.0.0.1",
                    "apps": [{"package": "p", "roblox_url": "u", "game_name": "g"}]
                }]
            }],
            "monitoring": {"check_interval": 30, "restart_delay": 5, "webhook_url": ""}
        });
        assert!(validate_unknown_keys(&doc).is_empty());
    }

    #[test]
    fn test_garbage_key_has_no_suggestion() {
        let doc = json!({"zzzzzzzzzzzz": 1});
        let warnings = validate_unknown_keys(&doc);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].suggestion.is_none());
    }
}
