//! Facade over discovery, connection, command execution, and the
//! snapshot cache. Integrators construct a [`HubClient`] from explicit
//! parts; nothing in here is global.

pub mod client;
pub mod notify;

pub use client::HubClient;
pub use notify::{LogNotifier, Notice, NoticeLevel, NoticeQueue, Notifier};

/// Errors surfaced by the facade.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Discovery(#[from] hublink_discovery::DiscoveryError),

    #[error(transparent)]
    Session(#[from] hublink_session::SessionError),

    #[error(transparent)]
    Queue(#[from] hublink_queue::QueueError),

    #[error(transparent)]
    Cache(#[from] hublink_cache::CacheError),

    #[error("no session data loaded; fetch it before sending commands")]
    NoSessionData,

    #[error("device {device_id} has no command {command_id}")]
    UnknownCommand {
        device_id: String,
        command_id: String,
    },
}
