//! The transport seam between the connection manager and the wire.
//!
//! Object-safe traits with boxed futures so fakes can be scripted in tests
//! without pulling in a real network stack.

use std::future::Future;
use std::pin::Pin;

use hublink_protocol::envelope::Message;
use hublink_protocol::{Hub, MessageType};

use crate::SessionError;

/// A live, stateful session with a hub.
///
/// Owned exclusively by the connection manager; nothing else holds one.
pub trait HubSession: Send + Sync {
    /// Sends a request and waits for the correlated response.
    fn send<'a>(
        &'a self,
        msg_type: MessageType,
        payload: Option<&'a serde_json::Value>,
    ) -> Pin<Box<dyn Future<Output = Result<Message, SessionError>> + Send + 'a>>;

    /// Gracefully closes the session.
    fn close<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<(), SessionError>> + Send + 'a>>;
}

/// Opens sessions to hubs.
pub trait SessionTransport: Send + Sync {
    /// Opens a session to the hub's address. The hub's optional `remote_id`
    /// is part of the session handshake on firmwares that require it.
    fn open<'a>(
        &'a self,
        hub: &'a Hub,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn HubSession>, SessionError>> + Send + 'a>>;
}
