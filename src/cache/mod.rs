/// In-process response cache revalidated by upstream ETags
///
/// Entries are best-effort: they vanish on restart and are not shared between
/// instances. A stale entry is still useful because its ETag lets the next
/// upstream read come back as `304 Not Modified`.
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

/// Default cap on cached keys
pub const DEFAULT_MAX_ENTRIES: usize = 1024;

#[derive(Debug, Clone)]
struct CachedEntry<V> {
    value: V,
    etag: Option<String>,
    stored_at: Instant,
}

/// Lookup result
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup<V> {
    /// Within TTL; serve directly
    Fresh(V),
    /// Expired but revalidatable with this ETag
    Stale { etag: Option<String> },
    Miss,
}

/// Keyed cache with a time-to-live and per-entry ETag
pub struct EtagCache<V> {
    entries: RwLock<HashMap<String, CachedEntry<V>>>,
    ttl: Duration,
    max_entries: usize,
}

impl<V: Clone> EtagCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self::with_capacity(ttl, DEFAULT_MAX_ENTRIES)
    }

    pub fn with_capacity(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    pub async fn lookup(&self, key: &str) -> CacheLookup<V> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => {
                CacheLookup::Fresh(entry.value.clone())
            }
            Some(entry) => CacheLookup::Stale {
                etag: entry.etag.clone(),
            },
            None => CacheLookup::Miss,
        }
    }

    /// Restart the TTL of an entry upstream confirmed unchanged
    pub async fn touch(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.write().await;
        entries.get_mut(key).map(|entry| {
            entry.stored_at = Instant::now();
            entry.value.clone()
        })
    }

    pub async fn store(&self, key: &str, value: V, etag: Option<String>) {
        let mut entries = self.entries.write().await;
        if entries.len() >= self.max_entries && !entries.contains_key(key) {
            self.evict(&mut entries);
        }
        entries.insert(
            key.to_string(),
            CachedEntry {
                value,
                etag,
                stored_at: Instant::now(),
            },
        );
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Drop expired entries, or the oldest one if none has expired
    fn evict(&self, entries: &mut HashMap<String, CachedEntry<V>>) {
        let before = entries.len();
        entries.retain(|_, e| e.stored_at.elapsed() < self.ttl);
        if entries.len() == before {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.stored_at)
                .map(|(k, _)| k.clone());
            if let Some(key) = oldest {
                entries.remove(&key);
            }
        }
        debug!("Cache evicted {} entries", before - entries.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entry_goes_stale_after_ttl() {
        let cache = EtagCache::new(Duration::from_secs(120));
        cache.store("42", "payload".to_string(), Some("\"v1\"".to_string())).await;

        assert_eq!(cache.lookup("42").await, CacheLookup::Fresh("payload".to_string()));

        tokio::time::advance(Duration::from_secs(121)).await;
        assert_eq!(
            cache.lookup("42").await,
            CacheLookup::Stale {
                etag: Some("\"v1\"".to_string())
            }
        );
        assert_eq!(cache.touch("42").await.as_deref(), Some("payload"));
        assert_eq!(cache.lookup("42").await, CacheLookup::Fresh("payload".to_string()));
        assert_eq!(cache.lookup("43").await, CacheLookup::Miss);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_evicts_oldest() {
        let cache = EtagCache::with_capacity(Duration::from_secs(600), 2);
        cache.store("a", 1, None).await;
        tokio::time::advance(Duration::from_secs(1)).await;
        cache.store("b", 2, None).await;
        tokio::time::advance(Duration::from_secs(1)).await;
        cache.store("c", 3, None).await;

        assert_eq!(cache.len().await, 2);
        assert_eq!(cache.lookup("a").await, CacheLookup::Miss);
        assert_eq!(cache.lookup("c").await, CacheLookup::Fresh(3));
    }
}
