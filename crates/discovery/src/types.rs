use serde::{Deserialize, Serialize};

use hublink_protocol::Hub;

/// mDNS service type hubs announce themselves under.
pub const SERVICE_NAME: &str = "_hublink-hub._tcp";

/// A single hub announcement as observed on the wire.
///
/// Any number of hubs may announce, any number of times, within a discovery
/// window; deduplication by `id` happens in the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HubAnnouncement {
    pub id: String,
    pub address: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firmware_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
}

impl HubAnnouncement {
    /// Converts the announcement into a model `Hub`.
    pub fn into_hub(self) -> Hub {
        Hub {
            id: self.id,
            name: self.display_name,
            address: self.address,
            firmware_version: self.firmware_version,
            remote_id: self.remote_id,
        }
    }
}
