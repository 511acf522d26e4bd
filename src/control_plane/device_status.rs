//! Tolerant parsing of control-plane device records.
//!
//! The same logical record shows up under several field spellings depending
//! on the endpoint and API generation. Everything is folded into one
//! [`DeviceStatus`] here so nothing downstream sees the raw shapes.

use serde_json::Value;
use std::collections::HashMap;

use crate::types::Device;

const ID_FIELDS: &[&str] = &["padCode", "phoneId", "id", "deviceId"];
const NAME_FIELDS: &[&str] = &["padName", "phoneName", "name", "deviceName"];
const STATUS_FIELDS: &[&str] = &["vmStatus", "padStatus"];
const ADDRESS_FIELDS: &[&str] = &["smartIp", "adbIp", "ip", "localIp", "wifiIp", "ipAddress"];
const LIST_FIELDS: &[&str] = &["list", "records", "pageData"];

/// Canonical view of one remote device record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceStatus {
    pub device_id: Option<String>,
    pub name: Option<String>,
    /// `None` when the record carries no usable status field.
    pub online: Option<bool>,
    pub address: Option<String>,
}

impl DeviceStatus {
    /// Parse one record. Non-object values yield `None`.
    pub fn from_record(record: &Value) -> Option<Self> {
        let obj = record.as_object()?;
        Some(Self {
            device_id: first_string(obj, ID_FIELDS),
            name: first_string(obj, NAME_FIELDS),
            online: online_flag(obj),
            address: first_string(obj, ADDRESS_FIELDS),
        })
    }

    /// Parse every record of a response envelope (`{"code":..,"data":..}`).
    pub fn from_response(response: &Value) -> Vec<Self> {
        extract_records(response)
            .iter()
            .filter_map(Self::from_record)
            .collect()
    }
}

/// Locate the record list: `data.list`, `data.records`, `data.pageData`, or
/// `data` itself when it is an array.
pub fn extract_records(response: &Value) -> &[Value] {
    let Some(data) = response.get("data") else {
        return &[];
    };
    if let Some(items) = data.as_array() {
        return items;
    }
    LIST_FIELDS
        .iter()
        .find_map(|f| data.get(*f).and_then(Value::as_array))
        .map_or(&[][..], Vec::as_slice)
}

/// First non-empty string among `fields`. Numeric ids are stringified.
fn first_string(obj: &serde_json::Map<String, Value>, fields: &[&str]) -> Option<String> {
    fields.iter().find_map(|f| match obj.get(*f)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn online_flag(obj: &serde_json::Map<String, Value>) -> Option<bool> {
    if let Some(v) = obj.get("online") {
        match v {
            Value::Bool(b) => return Some(*b),
            Value::Number(n) => return n.as_i64().map(|n| n == 1),
            Value::String(s) => match s.trim() {
                "1" | "true" => return Some(true),
                "0" | "false" => return Some(false),
                _ => {}
            },
            _ => {}
        }
    }
    STATUS_FIELDS.iter().find_map(|f| {
        let code = match obj.get(*f)? {
            Value::Number(n) => n.as_i64()?,
            Value::String(s) => s.trim().parse().ok()?,
            _ => return None,
        };
        match code {
            1 => Some(true),
            0 => Some(false),
            _ => None,
        }
    })
}

// ============================================================================
// Online Hints
// ============================================================================

/// Index of a device listing, looked up per configured device.
#[derive(Debug, Clone, Default)]
pub struct OnlineHints {
    by_id: HashMap<String, bool>,
    by_name: HashMap<String, bool>,
}

impl OnlineHints {
    pub fn from_statuses(statuses: &[DeviceStatus]) -> Self {
        let mut hints = Self::default();
        for status in statuses {
            let Some(online) = status.online else {
                continue;
            };
            if let Some(ref id) = status.device_id {
                merge(&mut hints.by_id, id, online);
            }
            if let Some(ref name) = status.name {
                merge(&mut hints.by_name, name, online);
            }
        }
        hints
    }

    /// Hint for a configured device: by id first, then by display name.
    pub fn lookup(&self, device: &Device) -> Option<bool> {
        self.by_id
            .get(&device.device_id)
            .or_else(|| self.by_name.get(&device.display_name))
            .copied()
    }

    pub fn len(&self) -> usize {
        self.by_id.len().max(self.by_name.len())
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty() && self.by_name.is_empty()
    }
}

/// Duplicates that disagree resolve to online.
fn merge(map: &mut HashMap<String, bool>, key: &str, online: bool) {
    map.entry(key.to_string())
        .and_modify(|v| *v |= online)
        .or_insert(online);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn device(id: &str, name: &str) -> Device {
        Device {
            device_id: id.to_string(),
            display_name: name.to_string(),
            address: "127.0.0.1:5555".to_string(),
            apps: Vec::new(),
        }
    }

    #[test]
    fn test_field_aliases() {
        let s = DeviceStatus::from_record(&json!({
            "phoneId": 12345, "phoneName": "p1", "online": 1, "adbIp": "10.0.0.2"
        }))
        .unwrap();
        assert_eq!(s.device_id.as_deref(), Some("12345"));
        assert_eq!(s.name.as_deref(), Some("p1"));
        assert_eq!(s.online, Some(true));
        assert_eq!(s.address.as_deref(), Some("10.0.0.2"));

        let s = DeviceStatus::from_record(&json!({"padCode": "AC1", "vmStatus": 0})).unwrap();
        assert_eq!(s.device_id.as_deref(), Some("AC1"));
        assert_eq!(s.online, Some(false));

        let s = DeviceStatus::from_record(&json!({"padCode": "AC2", "vmStatus": 3})).unwrap();
        assert_eq!(s.online, None);

        assert!(DeviceStatus::from_record(&json!("AC3")).is_none());
    }

    #[test]
    fn test_padcode_wins_over_id() {
        let s = DeviceStatus::from_record(&json!({"id": 7, "padCode": "AC9"})).unwrap();
        assert_eq!(s.device_id.as_deref(), Some("AC9"));
    }

    #[test]
    fn test_list_locations() {
        for response in [
            json!({"code": 200, "data": {"list": [{"padCode": "A"}]}}),
            json!({"code": 200, "data": {"records": [{"padCode": "A"}]}}),
            json!({"code": 200, "data": {"pageData": [{"padCode": "A"}]}}),
            json!({"code": 200, "data": [{"padCode": "A"}, 42]}),
        ] {
            let statuses = DeviceStatus::from_response(&response);
            assert_eq!(statuses.len(), 1, "{response}");
            assert_eq!(statuses[0].device_id.as_deref(), Some("A"));
        }
        assert!(DeviceStatus::from_response(&json!({"code": 200})).is_empty());
        assert!(DeviceStatus::from_response(&json!({"code": 200, "data": {}})).is_empty());
    }

    #[test]
    fn test_hints_lookup_by_id_then_name() {
        let statuses = vec![
            DeviceStatus {
                device_id: Some("AC1".into()),
                name: Some("phone-1".into()),
                online: Some(false),
                address: None,
            },
            DeviceStatus {
                device_id: Some("AC2".into()),
                name: Some("phone-2".into()),
                online: Some(true),
                address: None,
            },
        ];
        let hints = OnlineHints::from_statuses(&statuses);
        assert_eq!(hints.lookup(&device("AC1", "whatever")), Some(false));
        assert_eq!(hints.lookup(&device("unknown", "phone-2")), Some(true));
        assert_eq!(hints.lookup(&device("AC3", "phone-3")), None);
    }

    #[test]
    fn test_conflicting_duplicates_resolve_online() {
        let statuses = vec![
            DeviceStatus {
                device_id: Some("AC1".into()),
                online: Some(false),
                ..Default::default()
            },
            DeviceStatus {
                device_id: Some("AC1".into()),
                online: Some(true),
                ..Default::default()
            },
            DeviceStatus {
                device_id: Some("AC1".into()),
                online: Some(false),
                ..Default::default()
            },
        ];
        let hints = OnlineHints::from_statuses(&statuses);
        assert_eq!(hints.lookup(&device("AC1", "x")), Some(true));
    }
}
