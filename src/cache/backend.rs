use super::pattern::glob_match;
use crate::core::Result;
use async_trait::async_trait;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;

/// Raw key-value transport underneath [`Cache`](super::Cache).
///
/// Values are opaque byte snapshots, so a remote cache (redis and the like)
/// can implement this just as well as the in-process LRU below.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()>;

    async fn del(&self, keys: &[String]) -> Result<()>;

    /// All keys currently matching a glob pattern
    async fn keys(&self, pattern: &str) -> Result<Vec<String>>;
}

/// In-process backend bounded by an LRU entry budget
pub struct LruCacheBackend {
    entries: Mutex<LruCache<String, Vec<u8>>>,
}

impl LruCacheBackend {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheBackend for LruCacheBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut entries = self.entries.lock()?;
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let mut entries = self.entries.lock()?;
        entries.put(key.to_string(), value);
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<()> {
        let mut entries = self.entries.lock()?;
        for key in keys {
            entries.pop(key);
        }
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let entries = self.entries.lock()?;
        let mut matched = Vec::new();
        for (key, _) in entries.iter() {
            if glob_match(key, pattern)? {
                matched.push(key.clone());
            }
        }
        Ok(matched)
    }
}
