//! Cross-cutting decorators: retry-with-backoff for vendor adapters, and a
//! bounded LRU byte cache for the extractor.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::errors::VendorError;
use crate::types::Banana;
use crate::vendors::{FetchedMeeting, VendorAdapter};

/// Wraps any `VendorAdapter` with exponential backoff + jitter, retrying
/// only transient HTTP failures. Parsing and unsupported-operation errors
/// are never retried — they will not succeed on a second attempt.
pub struct RetryableVendorAdapter<A: VendorAdapter> {
    inner: A,
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl<A: VendorAdapter> RetryableVendorAdapter<A> {
    pub fn new(inner: A) -> Self {
        Self {
            inner,
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
        }
    }

    pub fn with_retry_config(mut self, max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.base_delay = base_delay;
        self.max_delay = max_delay;
        self
    }
}

#[async_trait]
impl<A: VendorAdapter + Send + Sync> VendorAdapter for RetryableVendorAdapter<A> {
    fn vendor(&self) -> crate::types::Vendor {
        self.inner.vendor()
    }

    async fn fetch_meetings(
        &self,
        banana: &Banana,
        slug: &str,
        max_count: usize,
    ) -> Result<Vec<FetchedMeeting>, VendorError> {
        let mut attempt = 0;
        let mut delay = self.base_delay;

        loop {
            attempt += 1;
            match self.inner.fetch_meetings(banana, slug, max_count).await {
                Ok(meetings) => {
                    if attempt > 1 {
                        info!(banana = %banana, attempt, "fetch_meetings succeeded after retry");
                    }
                    return Ok(meetings);
                }
                Err(e) if !e.is_retryable() || attempt >= self.max_retries => {
                    if attempt > 1 {
                        error!(banana = %banana, attempt, error = %e, "fetch_meetings failed, giving up");
                    }
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        banana = %banana,
                        attempt,
                        max_retries = self.max_retries,
                        error = %e,
                        "fetch_meetings failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay = std::cmp::min(delay * 2, self.max_delay);
                    let jitter = Duration::from_millis(rand::random::<u64>() % 100);
                    delay += jitter;
                }
            }
        }
    }
}

/// Simple LRU cache, capacity-bounded, used by the extractor to avoid
/// re-downloading a document shared by several agenda items within one
/// processing batch.
struct LruCache<K, V> {
    capacity: usize,
    map: HashMap<K, V>,
    access_order: Vec<K>,
}

impl<K: Clone + Eq + std::hash::Hash, V> LruCache<K, V> {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            map: HashMap::with_capacity(capacity),
            access_order: Vec::with_capacity(capacity),
        }
    }

    fn get(&mut self, key: &K) -> Option<&V> {
        if self.map.contains_key(key) {
            self.access_order.retain(|k| k != key);
            self.access_order.push(key.clone());
            self.map.get(key)
        } else {
            None
        }
    }

    fn insert(&mut self, key: K, value: V) {
        if self.map.len() >= self.capacity && !self.map.contains_key(&key) {
            if let Some(lru_key) = self.access_order.first().cloned() {
                self.access_order.remove(0);
                self.map.remove(&lru_key);
            }
        }

        self.map.insert(key.clone(), value);
        self.access_order.retain(|k| k != &key);
        self.access_order.push(key);
    }
}

/// Thread-safe, async-friendly byte cache keyed by a SHA-256 digest of the
/// source URL.
pub struct DocumentByteCache {
    inner: Arc<Mutex<LruCache<[u8; 32], Vec<u8>>>>,
    hits: Arc<Mutex<u64>>,
    misses: Arc<Mutex<u64>>,
}

impl DocumentByteCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(LruCache::new(capacity))),
            hits: Arc::new(Mutex::new(0)),
            misses: Arc::new(Mutex::new(0)),
        }
    }

    pub fn key_for(url: &str) -> [u8; 32] {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        hasher.finalize().into()
    }

    pub async fn get(&self, url: &str) -> Option<Vec<u8>> {
        let key = Self::key_for(url);
        let mut cache = self.inner.lock().await;
        if let Some(bytes) = cache.get(&key) {
            *self.hits.lock().await += 1;
            return Some(bytes.clone());
        }
        *self.misses.lock().await += 1;
        None
    }

    pub async fn insert(&self, url: &str, bytes: Vec<u8>) {
        let key = Self::key_for(url);
        self.inner.lock().await.insert(key, bytes);
    }

    pub async fn stats(&self) -> (u64, u64) {
        (*self.hits.lock().await, *self.misses.lock().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn document_byte_cache_hits_on_repeated_url() {
        let cache = DocumentByteCache::new(4);
        cache.insert("https://example.com/a.pdf", vec![1, 2, 3]).await;

        assert_eq!(cache.get("https://example.com/a.pdf").await, Some(vec![1, 2, 3]));
        assert!(cache.get("https://example.com/b.pdf").await.is_none());

        let (hits, misses) = cache.stats().await;
        assert_eq!(hits, 1);
        assert_eq!(misses, 1);
    }

    #[tokio::test]
    async fn document_byte_cache_evicts_least_recently_used() {
        let cache = DocumentByteCache::new(2);
        cache.insert("https://x/1", vec![1]).await;
        cache.insert("https://x/2", vec![2]).await;
        // touch 1 so 2 becomes LRU
        let _ = cache.get("https://x/1").await;
        cache.insert("https://x/3", vec![3]).await;

        assert!(cache.get("https://x/2").await.is_none());
        assert_eq!(cache.get("https://x/1").await, Some(vec![1]));
        assert_eq!(cache.get("https://x/3").await, Some(vec![3]));
    }
}
