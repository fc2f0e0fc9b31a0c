//! Hub session handling: the transport seam, the WebSocket client that
//! implements it, and the connection manager that owns the single live
//! session.

pub mod manager;
pub(crate) mod pumps;
pub mod transport;
pub mod types;
pub mod ws;

pub use manager::ConnectionManager;
pub use transport::{HubSession, SessionTransport};
pub use types::{ConnectionState, SessionConfig};
pub use ws::{WsSession, WsTransport};

/// Errors from session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("WebSocket error: {0}")]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("request timed out")]
    Timeout,

    #[error("session closed")]
    Closed,

    #[error("not connected to a hub")]
    NotConnected,

    #[error("connection attempt timed out")]
    ConnectTimeout,

    #[error("hub error {code}: {message}")]
    Hub { code: i32, message: String },

    #[error("empty {0} response from hub")]
    EmptyResponse(&'static str),

    #[error("reconnect to hub {hub} failed after {attempts} attempt(s): {last}")]
    ReconnectExhausted {
        hub: String,
        attempts: u32,
        last: String,
    },
}
