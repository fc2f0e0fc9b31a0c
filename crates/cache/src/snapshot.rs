//! TTL-bounded cache of the last session snapshot.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use hublink_protocol::CachedSnapshot;

use crate::CacheError;
use crate::store::KvStore;

const SNAPSHOT_KEY: &str = "session-snapshot";

/// Default snapshot lifetime. Hub configurations change rarely; a day of
/// staleness is acceptable and a forced refresh is always available.
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Caches the most recent [`CachedSnapshot`] in a [`KvStore`].
///
/// Holds a single record: connecting to a different hub overwrites it.
pub struct SnapshotCache {
    store: Arc<dyn KvStore>,
    ttl: Duration,
}

impl SnapshotCache {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self::with_ttl(store, DEFAULT_TTL)
    }

    pub fn with_ttl(store: Arc<dyn KvStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Returns the cached snapshot for `hub_id`, or `None` on any kind of
    /// miss: no record, a record for a different hub, an expired record,
    /// or a record that no longer parses. Stale or corrupt data is never
    /// served.
    pub fn get(&self, hub_id: &str) -> Result<Option<CachedSnapshot>, CacheError> {
        let Some(raw) = self.store.get(SNAPSHOT_KEY)? else {
            return Ok(None);
        };

        let snapshot: CachedSnapshot = match serde_json::from_str(&raw) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "cached snapshot is corrupt, treating as miss");
                return Ok(None);
            }
        };

        if snapshot.hub.id != hub_id {
            debug!(
                cached = %snapshot.hub.id,
                requested = %hub_id,
                "cached snapshot belongs to a different hub"
            );
            return Ok(None);
        }

        if !snapshot.is_fresh(self.ttl, Utc::now()) {
            debug!(hub = %hub_id, "cached snapshot expired");
            return Ok(None);
        }

        Ok(Some(snapshot))
    }

    /// Replaces the cached snapshot. The whole record is written in one
    /// atomic step; a crash never leaves a mix of old and new data.
    pub fn set(&self, snapshot: &CachedSnapshot) -> Result<(), CacheError> {
        let json = serde_json::to_string(snapshot)?;
        self.store.set(SNAPSHOT_KEY, &json)?;
        debug!(hub = %snapshot.hub.id, "snapshot cached");
        Ok(())
    }

    /// Drops the cached snapshot, if any.
    pub fn clear(&self) -> Result<(), CacheError> {
        self.store.remove(SNAPSHOT_KEY)
    }
}
