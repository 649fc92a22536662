//! Time-bounded cache of search results keyed by query fingerprint.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

use crate::result::SearchResult;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: SearchResult,
    expires_at: Instant,
}

/// At most one live entry per fingerprint; expired entries are never
/// returned.
#[derive(Debug)]
pub struct ResultCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    max_entries: usize,
}

impl ResultCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries: max_entries.max(1),
        }
    }

    /// The live result for `fingerprint`, if any.
    pub async fn get(&self, fingerprint: &str) -> Option<SearchResult> {
        {
            let entries = self.entries.read().await;
            match entries.get(fingerprint) {
                Some(entry) if entry.expires_at > Instant::now() => {
                    return Some(entry.value.clone());
                }
                Some(_) => {}
                None => return None,
            }
        }

        // Expired: drop it unless a fresh value replaced it meanwhile.
        let mut entries = self.entries.write().await;
        if entries
            .get(fingerprint)
            .is_some_and(|e| e.expires_at <= Instant::now())
        {
            entries.remove(fingerprint);
            debug!("Dropped expired result cache entry");
        }
        None
    }

    /// Store `result` under `fingerprint` for `ttl`, replacing any previous
    /// entry.
    pub async fn set(&self, fingerprint: impl Into<String>, result: SearchResult, ttl: Duration) {
        let fingerprint = fingerprint.into();
        let now = Instant::now();
        let mut entries = self.entries.write().await;

        if !entries.contains_key(&fingerprint) && entries.len() >= self.max_entries {
            entries.retain(|_, e| e.expires_at > now);
            if entries.len() >= self.max_entries {
                if let Some(soonest) = entries
                    .iter()
                    .min_by_key(|(_, e)| e.expires_at)
                    .map(|(k, _)| k.clone())
                {
                    entries.remove(&soonest);
                }
            }
        }

        entries.insert(
            fingerprint,
            CacheEntry {
                value: result,
                expires_at: now + ttl,
            },
        );
    }

    /// Remove the entry for `fingerprint`. Returns whether one existed.
    pub async fn invalidate(&self, fingerprint: &str) -> bool {
        self.entries.write().await.remove(fingerprint).is_some()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Drop every expired entry. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        before - entries.len()
    }

    /// Number of stored entries, expired ones included until purged.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::SearchMethod;
    use pretty_assertions::assert_eq;

    fn result(query: &str) -> SearchResult {
        SearchResult::new(query, Vec::new(), SearchMethod::Text, Duration::from_millis(5))
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let cache = ResultCache::new(10);
        cache.set("fp", result("a"), Duration::from_secs(60)).await;

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(cache.get("fp").await.map(|r| r.query), Some("a".to_string()));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.get("fp").await.is_none());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_set_replaces_existing_entry() {
        let cache = ResultCache::new(10);
        cache.set("fp", result("old"), Duration::from_secs(60)).await;
        cache.set("fp", result("new"), Duration::from_secs(60)).await;

        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.get("fp").await.unwrap().query, "new");
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_cache_evicts_soonest_expiry() {
        let cache = ResultCache::new(2);
        cache.set("short", result("s"), Duration::from_secs(10)).await;
        cache.set("long", result("l"), Duration::from_secs(100)).await;
        cache.set("third", result("t"), Duration::from_secs(50)).await;

        assert_eq!(cache.len().await, 2);
        assert!(cache.get("short").await.is_none());
        assert!(cache.get("long").await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_and_purge() {
        let cache = ResultCache::new(10);
        cache.set("a", result("a"), Duration::from_secs(1)).await;
        cache.set("b", result("b"), Duration::from_secs(100)).await;

        assert!(cache.invalidate("b").await);
        assert!(!cache.invalidate("b").await);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.purge_expired().await, 1);
        assert!(cache.is_empty().await);
    }
}
