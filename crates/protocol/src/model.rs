//! Data model for hubs, devices, commands and activities.
//!
//! Model values are immutable once produced: a refresh replaces whole
//! collections rather than mutating entries in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A hub discovered on the local network.
///
/// `id` is the hub's opaque identity and is distinct from the display name;
/// deduplication and cache matching key on it exclusively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hub {
    pub id: String,
    pub name: String,
    /// Network address (`ip:port`) the session transport connects to.
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firmware_version: Option<String>,
    /// Session identifier some hub firmwares require to open a session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
}

/// An appliance the hub can command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub device_type: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<Command>,
}

/// A single command a device understands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    /// Hub-recognized action token sent on the wire.
    pub action: String,
    pub label: String,
    pub device_id: String,
    /// Protocol group tag used to pick the command envelope, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_group: Option<String>,
}

/// A hub-defined macro/mode ("Watch TV"). At most one is current at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub activity_type: String,
    #[serde(default)]
    pub is_current: bool,
}

/// Enforces the single-current-activity invariant on a fetched list.
///
/// Hubs occasionally report more than one current activity mid-switch;
/// the first one observed wins and the rest are cleared.
pub fn normalize_current_activity(activities: &mut [Activity]) {
    let mut seen_current = false;
    for activity in activities.iter_mut() {
        if activity.is_current {
            if seen_current {
                activity.is_current = false;
            }
            seen_current = true;
        }
    }
}

/// The cached {hub, devices, activities, timestamp} tuple.
///
/// Replaced wholesale on refresh; never partially overwritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedSnapshot {
    pub hub: Hub,
    pub devices: Vec<Device>,
    pub activities: Vec<Activity>,
    pub fetched_at: DateTime<Utc>,
}

impl CachedSnapshot {
    /// Returns true if the snapshot is still inside its TTL at `now`.
    pub fn is_fresh(&self, ttl: std::time::Duration, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.fetched_at);
        match chrono::Duration::from_std(ttl) {
            Ok(ttl) => age < ttl,
            Err(_) => true, // TTL too large to represent — treat as unlimited
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn test_hub() -> Hub {
        Hub {
            id: "h1".into(),
            name: "Living Room".into(),
            address: "10.0.0.5:8088".into(),
            firmware_version: Some("4.15.250".into()),
            remote_id: Some("r-77".into()),
        }
    }

    fn activity(id: &str, current: bool) -> Activity {
        Activity {
            id: id.into(),
            label: format!("Activity {id}"),
            activity_type: "av".into(),
            is_current: current,
        }
    }

    #[test]
    fn hub_json_roundtrip() {
        let hub = test_hub();
        let json = serde_json::to_string(&hub).unwrap();
        let parsed: Hub = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, hub);
    }

    #[test]
    fn hub_optional_fields_omitted() {
        let mut hub = test_hub();
        hub.firmware_version = None;
        hub.remote_id = None;
        let json = serde_json::to_string(&hub).unwrap();
        assert!(!json.contains("firmwareVersion"));
        assert!(!json.contains("remoteId"));
    }

    #[test]
    fn normalize_keeps_single_current() {
        let mut activities = vec![activity("a1", false), activity("a2", true)];
        normalize_current_activity(&mut activities);
        assert!(!activities[0].is_current);
        assert!(activities[1].is_current);
    }

    #[test]
    fn normalize_first_current_wins() {
        let mut activities = vec![
            activity("a1", true),
            activity("a2", true),
            activity("a3", true),
        ];
        normalize_current_activity(&mut activities);
        assert!(activities[0].is_current);
        assert!(!activities[1].is_current);
        assert!(!activities[2].is_current);
    }

    #[test]
    fn normalize_handles_none_current() {
        let mut activities = vec![activity("a1", false), activity("a2", false)];
        normalize_current_activity(&mut activities);
        assert!(activities.iter().all(|a| !a.is_current));
    }

    #[test]
    fn snapshot_fresh_within_ttl() {
        let snapshot = CachedSnapshot {
            hub: test_hub(),
            devices: vec![],
            activities: vec![],
            fetched_at: Utc::now(),
        };
        assert!(snapshot.is_fresh(Duration::from_secs(60), Utc::now()));
    }

    #[test]
    fn snapshot_stale_at_ttl_boundary() {
        let fetched_at = Utc::now();
        let snapshot = CachedSnapshot {
            hub: test_hub(),
            devices: vec![],
            activities: vec![],
            fetched_at,
        };
        let now = fetched_at + chrono::Duration::hours(24);
        assert!(!snapshot.is_fresh(Duration::from_secs(24 * 3600), now));
    }

    #[test]
    fn snapshot_json_roundtrip() {
        let snapshot = CachedSnapshot {
            hub: test_hub(),
            devices: vec![Device {
                id: "d1".into(),
                label: "TV".into(),
                device_type: "television".into(),
                commands: vec![Command {
                    action: "PowerOn".into(),
                    label: "Power On".into(),
                    device_id: "d1".into(),
                    command_group: Some("Power".into()),
                }],
            }],
            activities: vec![activity("a1", true)],
            fetched_at: Utc::now(),
        };
        let json = serde_json::to_string(&snapshot).unwrap();
        let parsed: CachedSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, snapshot);
    }
}
