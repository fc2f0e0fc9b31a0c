//! Typed request/response payloads for the hub session protocol.
//!
//! Hubs report device and activity configuration in a nested, loosely-typed
//! shape. The `Raw*` structs model that wire shape with defaults on every
//! field the firmware may omit; `into_model` conversions flatten them into
//! the strongly-typed model at the boundary so nothing downstream has to
//! trust wire shapes.

use serde::{Deserialize, Serialize};

use crate::model::{Activity, Command, Device};

// ---------------------------------------------------------------------------
// Request payloads
// ---------------------------------------------------------------------------

/// Asks the hub to switch to an activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartActivityRequest {
    pub activity_id: String,
}

/// Presses or releases a device command.
///
/// One logical command execution is a press followed by a release after a
/// hold interval; both carry the same action token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldActionRequest {
    pub action: String,
    pub device_id: String,
    pub press: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_group: Option<String>,
}

// ---------------------------------------------------------------------------
// Response payloads
// ---------------------------------------------------------------------------

/// Device configuration response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceListResponse {
    #[serde(default)]
    pub devices: Vec<RawDevice>,
}

impl DeviceListResponse {
    /// Flattens the raw wire shape into model devices.
    pub fn into_model(self) -> Vec<Device> {
        self.devices.into_iter().map(RawDevice::into_model).collect()
    }
}

/// Activity list response. Already close to the model shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityListResponse {
    #[serde(default)]
    pub activities: Vec<Activity>,
}

/// Acknowledgement for a start-activity request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityStartedResponse {
    pub activity_id: String,
    #[serde(default)]
    pub success: bool,
}

// ---------------------------------------------------------------------------
// Raw wire shapes
// ---------------------------------------------------------------------------

/// A device as the hub firmware reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDevice {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default, rename = "type")]
    pub device_type: String,
    #[serde(default)]
    pub control_groups: Vec<RawControlGroup>,
}

impl RawDevice {
    fn into_model(self) -> Device {
        let device_id = self.id.clone();
        let commands = self
            .control_groups
            .into_iter()
            .flat_map(|group| {
                let group_name = group.name.clone();
                group.functions.into_iter().filter_map(move |f| {
                    // Entries without an action token cannot be invoked.
                    let action = f.action?;
                    Some(Command {
                        label: if f.label.is_empty() {
                            action.clone()
                        } else {
                            f.label
                        },
                        action,
                        device_id: String::new(), // filled below
                        command_group: group_name.clone(),
                    })
                })
            })
            .map(|mut c| {
                c.device_id = device_id.clone();
                c
            })
            .collect();

        Device {
            id: self.id,
            label: self.label,
            device_type: self.device_type,
            commands,
        }
    }
}

/// A named group of functions on a device ("Power", "Volume").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawControlGroup {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "function")]
    pub functions: Vec<RawFunction>,
}

/// A single function inside a control group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFunction {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub label: String,
}
