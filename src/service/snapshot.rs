//! Short-lived still-image cache.

use std::collections::HashMap;

use bytes::Bytes;
use tokio::sync::RwLock;
use tokio::time::{Duration, Instant};

/// Collapses bursts of still-image requests into one upstream fetch.
///
/// Entries expire lazily on `get`; no eviction timer runs in the
/// background. A refresh is last-write-wins.
pub struct SnapshotCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, (Bytes, Instant)>>,
}

impl SnapshotCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// The cached payload for a camera, if one is still fresh. A stale
    /// entry is evicted on the miss that discovers it.
    pub async fn get(&self, camera_id: &str) -> Option<Bytes> {
        {
            let entries = self.entries.read().await;
            match entries.get(camera_id) {
                Some((payload, stored)) if stored.elapsed() < self.ttl => {
                    return Some(payload.clone());
                }
                Some(_) => {}
                None => return None,
            }
        }
        let mut entries = self.entries.write().await;
        match entries.get(camera_id) {
            // A writer may have refreshed the entry between the locks.
            Some((payload, stored)) if stored.elapsed() < self.ttl => Some(payload.clone()),
            Some(_) => {
                entries.remove(camera_id);
                None
            }
            None => None,
        }
    }

    /// Store a payload stamped now.
    pub async fn put(&self, camera_id: &str, payload: Bytes) {
        self.entries
            .write()
            .await
            .insert(camera_id.to_string(), (payload, Instant::now()));
    }

    /// Drop all entries. Used on full shutdown.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}
