//! Seam between the queue and the live session.

use std::future::Future;
use std::pin::Pin;

use hublink_protocol::messages::HoldActionRequest;
use hublink_session::{ConnectionManager, SessionError};

/// What the queue needs from a connection: a liveness guarantee and the
/// ability to push one half of a hold action. Mocked in tests.
pub trait CommandSender: Send + Sync {
    /// Verifies the session is usable, reconnecting if needed.
    fn ensure<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<(), SessionError>> + Send + 'a>>;

    /// Sends one press or release action.
    fn send_action<'a>(
        &'a self,
        action: &'a HoldActionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<(), SessionError>> + Send + 'a>>;
}

impl CommandSender for ConnectionManager {
    fn ensure<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<(), SessionError>> + Send + 'a>> {
        Box::pin(self.ensure_connected())
    }

    fn send_action<'a>(
        &'a self,
        action: &'a HoldActionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<(), SessionError>> + Send + 'a>> {
        Box::pin(ConnectionManager::send_action(self, action))
    }
}
