//! Hub discovery: announcement listening plus the coordinator that
//! time-bounds, deduplicates and coalesces discovery runs.

pub mod coordinator;
pub mod listener;
pub mod mdns;
pub mod types;

// Re-export primary types.
pub use coordinator::{DiscoveryConfig, DiscoveryCoordinator};
pub use listener::AnnouncementListener;
pub use mdns::MdnsListener;
pub use types::{HubAnnouncement, SERVICE_NAME};

/// Errors for discovery operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DiscoveryError {
    #[error("announcement listener failed to start: {0}")]
    ListenerStart(String),

    #[error("network error: {0}")]
    Network(String),

    /// The listener failed mid-run. Hubs observed before the failure are
    /// still returned here rather than discarded.
    #[error("discovery interrupted after {} hub(s): {reason}", hubs.len())]
    Interrupted {
        hubs: Vec<hublink_protocol::Hub>,
        reason: String,
    },
}
