use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use recipe_backend_core::cache::{is_valid_key, CacheClient, CacheItem};
use tokio::{sync::Mutex, time::Instant};

/// An error type for [`MemoryCache`].
#[derive(thiserror::Error, Debug)]
pub enum MemoryCacheError {
    /// The key is empty, too long, or contains characters a network cache
    /// would refuse.
    #[error("invalid cache key: {0:?}")]
    InvalidKey(String),
}

#[derive(Debug)]
struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(item: &CacheItem) -> Self {
        let expires_at = (!item.ttl.is_zero()).then(|| Instant::now() + item.ttl);
        Self {
            value: item.value.clone(),
            expires_at,
        }
    }

    fn is_live(&self) -> bool {
        self.expires_at.map_or(true, |at| at > Instant::now())
    }
}

/// A cache that lives only in memory.
///
/// Keys follow the same rules as a network cache, and items expire after
/// their TTL (measured on the tokio clock, so tests may pause it). A zero TTL
/// means the item never expires.
///
/// # Examples
///
/// ```rust
/// use recipe_backend_memory_store::MemoryCache;
/// MemoryCache::default();
/// ```
#[derive(Clone, Debug, Default)]
pub struct MemoryCache(Arc<Mutex<HashMap<String, Entry>>>);

impl MemoryCache {
    /// The number of live items.
    pub async fn len(&self) -> usize {
        self.0.lock().await.values().filter(|e| e.is_live()).count()
    }

    /// Returns `true` if no live item is stored.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn check_key(key: &str) -> Result<(), MemoryCacheError> {
    if is_valid_key(key) {
        Ok(())
    } else {
        Err(MemoryCacheError::InvalidKey(key.to_string()))
    }
}

#[async_trait]
impl CacheClient for MemoryCache {
    type Error = MemoryCacheError;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Self::Error> {
        check_key(key)?;
        Ok(self
            .0
            .lock()
            .await
            .get(key)
            .filter(|entry| entry.is_live())
            .map(|entry| entry.value.clone()))
    }

    async fn set(&self, item: &CacheItem) -> Result<(), Self::Error> {
        check_key(&item.key)?;
        self.0.lock().await.insert(item.key.clone(), Entry::new(item));
        Ok(())
    }

    async fn add(&self, item: &CacheItem) -> Result<bool, Self::Error> {
        check_key(&item.key)?;
        let mut entries = self.0.lock().await;
        if entries.get(&item.key).is_some_and(Entry::is_live) {
            return Ok(false);
        }
        entries.insert(item.key.clone(), Entry::new(item));
        Ok(true)
    }

    async fn replace(&self, item: &CacheItem) -> Result<bool, Self::Error> {
        check_key(&item.key)?;
        let mut entries = self.0.lock().await;
        match entries.get_mut(&item.key) {
            Some(entry) if entry.is_live() => {
                *entry = Entry::new(item);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, Self::Error> {
        check_key(key)?;
        Ok(self
            .0
            .lock()
            .await
            .remove(key)
            .is_some_and(|entry| entry.is_live()))
    }
}
