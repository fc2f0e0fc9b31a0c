//! Snapshot cache backed by a persistent key-value store.
//!
//! Session snapshots (devices + activities for one hub) are written to
//! `~/.config/hublink/cache/` as JSON, one file per key, and served back
//! while fresh so reconnects skip the expensive configuration fetch.

pub mod snapshot;
pub mod store;

pub use snapshot::SnapshotCache;
pub use store::{FileStore, KvStore};

/// Errors from cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config directory not available")]
    NoConfigDir,
}
