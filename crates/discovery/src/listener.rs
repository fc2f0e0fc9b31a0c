//! The announcement-listener seam between the coordinator and whatever
//! transport actually hears hub broadcasts.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;

use crate::DiscoveryError;
use crate::types::HubAnnouncement;

/// A transport that listens for hub announcements.
///
/// `start` opens the listener and yields the announcement stream; `stop`
/// tears it down and must be idempotent (safe to call twice, and safe to
/// call before `start`). Dropping the receiver alone does not stop the
/// underlying listener.
pub trait AnnouncementListener: Send + Sync {
    fn start(
        &self,
    ) -> Pin<
        Box<dyn Future<Output = Result<mpsc::Receiver<HubAnnouncement>, DiscoveryError>> + Send + '_>,
    >;

    fn stop(&self) -> Pin<Box<dyn Future<Output = Result<(), DiscoveryError>> + Send + '_>>;
}
