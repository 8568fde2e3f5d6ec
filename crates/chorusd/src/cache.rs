//! Response cache keyed by mode and prompt, with per-entry TTL.

use chorus_common::{AnswerResponse, Mode};
use lru::LruCache;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::debug;

/// SHA-256 hex of `"<mode>::<trimmed prompt>"`
pub fn cache_key(mode: Mode, prompt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}::{}", mode, prompt.trim()).as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone)]
struct CacheEntry {
    response: AnswerResponse,
    expires_at: Instant,
}

/// Capacity-bounded TTL store for final answers
pub struct ResponseCache {
    entries: RwLock<LruCache<String, CacheEntry>>,
}

impl ResponseCache {
    /// Create a cache holding at most `capacity` entries (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: RwLock::new(LruCache::new(capacity)),
        }
    }

    /// Stored response for `key`, or None if absent or expired
    pub async fn get(&self, key: &str) -> Option<AnswerResponse> {
        let entries = self.entries.read().await;
        entries
            .peek(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.response.clone())
    }

    /// Store `response` for `ttl`. A zero TTL stores nothing.
    pub async fn set(&self, key: String, mut response: AnswerResponse, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        response.cached = false;
        let entry = CacheEntry {
            response,
            expires_at: Instant::now() + ttl,
        };
        self.entries.write().await.put(key, entry);
    }

    /// Remove expired entries, returning how many were dropped
    pub async fn prune_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let now = Instant::now();

        let expired_keys: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| entry.expires_at <= now)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired_keys {
            entries.pop(key);
        }
        expired_keys.len()
    }

    /// Entries currently held, expired or not
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Prune expired entries every `interval` until the task is aborted
    pub fn spawn_pruner(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let pruned = cache.prune_expired().await;
                if pruned > 0 {
                    debug!("Pruned {} expired cache entries", pruned);
                }
            }
        })
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chorus_common::Candidate;

    fn response(text: &str) -> AnswerResponse {
        AnswerResponse {
            final_answer: text.to_string(),
            candidates: vec![Candidate {
                provider: "llama3.2".to_string(),
                text: text.to_string(),
                latency_ms: 12,
            }],
            cached: false,
            mode: Mode::Fast,
        }
    }

    #[test]
    fn test_key_is_hex_sha256() {
        let key = cache_key(Mode::Fast, "hello");
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(key, cache_key(Mode::Fast, "  hello \n"));
    }

    #[test]
    fn test_key_depends_on_mode() {
        assert_ne!(cache_key(Mode::Fast, "hello"), cache_key(Mode::Quality, "hello"));
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let cache = ResponseCache::new(16);
        cache.set("k".to_string(), response("hi"), Duration::from_secs(60)).await;

        let hit = cache.get("k").await.unwrap();
        assert_eq!(hit.final_answer, "hi");
        assert!(!hit.cached);
        assert!(cache.get("other").await.is_none());
    }

    #[tokio::test]
    async fn test_stored_copy_never_flagged_cached() {
        let cache = ResponseCache::new(16);
        let mut flagged = response("hi");
        flagged.cached = true;
        cache.set("k".to_string(), flagged, Duration::from_secs(60)).await;
        assert!(!cache.get("k").await.unwrap().cached);
    }

    #[tokio::test]
    async fn test_expired_entry_is_a_miss() {
        let cache = ResponseCache::new(16);
        cache.set("k".to_string(), response("hi"), Duration::from_millis(50)).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(cache.get("k").await.is_none());
        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.prune_expired().await, 1);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_zero_ttl_skips_write() {
        let cache = ResponseCache::new(16);
        cache.set("k".to_string(), response("hi"), Duration::ZERO).await;
        assert!(cache.get("k").await.is_none());
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let cache = ResponseCache::new(16);
        cache.set("k".to_string(), response("one"), Duration::from_secs(60)).await;
        cache.set("k".to_string(), response("two"), Duration::from_secs(60)).await;
        assert_eq!(cache.get("k").await.unwrap().final_answer, "two");
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_readers_and_writers() {
        const KEYS: usize = 4;
        const VERSIONS: usize = 50;

        let cache = Arc::new(ResponseCache::new(64));
        cache.set("stale".to_string(), response("old"), Duration::from_millis(20)).await;
        tokio::time::sleep(Duration::from_millis(40)).await;

        let mut tasks = tokio::task::JoinSet::new();
        for k in 0..KEYS {
            let cache = Arc::clone(&cache);
            tasks.spawn(async move {
                for v in 0..VERSIONS {
                    let ttl = Duration::from_secs(60);
                    cache.set(format!("k{}", k), response(&v.to_string()), ttl).await;
                    tokio::task::yield_now().await;
                }
            });
        }
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            tasks.spawn(async move {
                let mut last_seen = vec![0usize; KEYS];
                for _ in 0..VERSIONS {
                    assert!(cache.get("stale").await.is_none());
                    for (k, last) in last_seen.iter_mut().enumerate() {
                        if let Some(hit) = cache.get(&format!("k{}", k)).await {
                            let version: usize = hit.final_answer.parse().unwrap();
                            // A key's visible version never goes backwards
                            assert!(version >= *last);
                            *last = version;
                        }
                    }
                    tokio::task::yield_now().await;
                }
            });
        }
        while let Some(joined) = tasks.join_next().await {
            joined.unwrap();
        }

        for k in 0..KEYS {
            let hit = cache.get(&format!("k{}", k)).await.unwrap();
            assert_eq!(hit.final_answer, (VERSIONS - 1).to_string());
        }
        assert!(cache.get("stale").await.is_none());
        assert_eq!(cache.len().await, KEYS + 1);
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest_insert() {
        let cache = ResponseCache::new(2);
        let ttl = Duration::from_secs(60);
        cache.set("a".to_string(), response("a"), ttl).await;
        cache.set("b".to_string(), response("b"), ttl).await;
        // Reads do not refresh recency
        cache.get("a").await;
        cache.set("c".to_string(), response("c"), ttl).await;

        assert!(cache.get("a").await.is_none());
        assert!(cache.get("b").await.is_some());
        assert!(cache.get("c").await.is_some());
    }

    #[tokio::test]
    async fn test_pruner_removes_expired() {
        let cache = Arc::new(ResponseCache::new(16));
        cache.set("k".to_string(), response("hi"), Duration::from_millis(20)).await;

        let handle = cache.spawn_pruner(Duration::from_millis(30));
        tokio::time::sleep(Duration::from_millis(120)).await;
        handle.abort();

        assert_eq!(cache.len().await, 0);
    }
}
