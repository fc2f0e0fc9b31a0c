use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Time allowed to write a session message.
pub const WS_WRITE_WAIT: Duration = Duration::from_secs(30);

/// Time to wait for any incoming traffic before declaring the session dead.
///
/// This acts as a read deadline: if *nothing* arrives within this window
/// (no pong, no response, no push event), the connection is considered
/// dead and the read pump exits.
pub const WS_SILENCE_WAIT: Duration = Duration::from_secs(60);

/// How often to send keepalive pings (must be well below the silence wait).
pub const WS_PING_PERIOD: Duration = Duration::from_secs(15);

/// Maximum session message size in bytes (1 MB — hub responses are small).
pub const WS_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Timeout for a single request/response exchange with the hub.
pub const WS_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Session message type identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    // Requests from client to hub
    #[serde(rename = "get_devices")]
    GetDevices,
    #[serde(rename = "get_activities")]
    GetActivities,
    #[serde(rename = "start_activity")]
    StartActivity,
    #[serde(rename = "hold_action")]
    HoldAction,
    #[serde(rename = "ping")]
    Ping,

    // Responses from hub to client
    #[serde(rename = "device_list")]
    DeviceList,
    #[serde(rename = "activity_list")]
    ActivityList,
    #[serde(rename = "activity_started")]
    ActivityStarted,
    #[serde(rename = "action_ack")]
    ActionAck,
    #[serde(rename = "pong")]
    Pong,
    #[serde(rename = "error")]
    Error,

    // Events pushed by the hub
    #[serde(rename = "activity_changed")]
    ActivityChanged,

    /// Forward compatibility: unknown message types deserialize here.
    #[serde(other)]
    Unknown,
}

/// Common session error codes.
pub const ERR_CODE_BAD_REQUEST: i32 = 400;
pub const ERR_CODE_NOT_FOUND: i32 = 404;
pub const ERR_CODE_INTERNAL: i32 = 500;
