//! Time-bounded cache of fetched snapshots.

use crate::models::Snapshot;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

/// Default time a snapshot stays fresh.
pub const DEFAULT_SNAPSHOT_TTL: Duration = Duration::from_secs(30 * 60);

struct Entry {
    snapshot: Snapshot,
    stored_at: Instant,
}

/// Snapshots keyed by requested URL, shared across runs.
pub struct SnapshotCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, Entry>>,
}

impl SnapshotCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Fresh snapshot for `url`, if one is cached.
    pub async fn get(&self, url: &str) -> Option<Snapshot> {
        let entries = self.entries.read().await;
        let entry = entries.get(url)?;
        if entry.stored_at.elapsed() < self.ttl {
            debug!(url, "snapshot_cache_hit");
            Some(entry.snapshot.clone())
        } else {
            None
        }
    }

    pub async fn insert(&self, url: &str, snapshot: Snapshot) {
        let mut entries = self.entries.write().await;
        entries.retain(|_, e| e.stored_at.elapsed() < self.ttl);
        entries.insert(
            url.to_string(),
            Entry {
                snapshot,
                stored_at: Instant::now(),
            },
        );
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

impl Default for SnapshotCache {
    fn default() -> Self {
        Self::new(DEFAULT_SNAPSHOT_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::testing::sample_snapshot;

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_after_ttl() {
        let cache = SnapshotCache::new(Duration::from_secs(60));
        cache.insert("https://a.example/", sample_snapshot("https://a.example/")).await;
        assert!(cache.get("https://a.example/").await.is_some());
        assert!(cache.get("https://b.example/").await.is_none());

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(cache.get("https://a.example/").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_insert_evicts_stale_entries() {
        let cache = SnapshotCache::new(Duration::from_secs(10));
        cache.insert("https://a.example/", sample_snapshot("https://a.example/")).await;
        tokio::time::advance(Duration::from_secs(11)).await;
        cache.insert("https://b.example/", sample_snapshot("https://b.example/")).await;
        assert_eq!(cache.len().await, 1);
    }
}
