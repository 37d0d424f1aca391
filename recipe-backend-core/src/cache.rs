//! A remote key-value cache as seen by the rest of the backend.
//!
//! The [`CacheClient`] trait describes the handful of primitives the session
//! store and the cache-aside layer rely on. Implementations live in their own
//! crates (Redis, in-memory).
//!
//! # Implementing a cache client
//!
//! The `Err(...)` case of every method is reserved for hard errors: the cache
//! could not be reached, the protocol failed, or the key was rejected. A miss,
//! or a conditional write that was refused because of the key's current
//! state, is an expected outcome and _must_ be reported through the `Ok`
//! value instead.
use std::{fmt::Debug, time::Duration};

use async_trait::async_trait;

/// The longest key, in bytes, a cache client _must_ accept.
///
/// This is the smallest bound among the supported transports (memcached
/// limits keys to 250 bytes), so session tokens and prefixed resource keys are
/// kept under it regardless of backend.
pub const MAX_KEY_LEN: usize = 250;

/// Returns `true` if `key` is acceptable to every supported cache transport.
///
/// Keys must be non-empty, at most [`MAX_KEY_LEN`] bytes, and contain only
/// printable ASCII without whitespace.
///
/// # Examples
///
/// ```rust
/// use recipe_backend_core::cache::is_valid_key;
///
/// assert!(is_valid_key("recipe_0190b8f6-6d1b-7c3e-8e2f-3f5c2b1a0d9e"));
/// assert!(!is_valid_key("has space"));
/// assert!(!is_valid_key(""));
/// ```
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty() && key.len() <= MAX_KEY_LEN && key.bytes().all(|b| b.is_ascii_graphic())
}

/// A single value to be written to the cache.
///
/// Items are usually borrowed from an [`ItemPool`](crate::ItemPool) rather
/// than built fresh for every call.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CacheItem {
    /// The cache key.
    pub key: String,

    /// The raw value.
    pub value: Vec<u8>,

    /// How long the cache should keep the item.
    ///
    /// The wire protocols carry whole seconds; see [`CacheItem::ttl_secs`].
    pub ttl: Duration,
}

impl CacheItem {
    /// Create an item from its parts.
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>, ttl: Duration) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            ttl,
        }
    }

    /// The TTL in whole seconds, rounded up so a sub-second TTL never turns
    /// into "no expiry".
    pub fn ttl_secs(&self) -> u64 {
        let secs = self.ttl.as_secs();
        if self.ttl.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs
        }
    }

    /// Clear every field.
    ///
    /// Buffers keep their capacity, but no byte of the previous key or value
    /// remains observable.
    pub fn reset(&mut self) {
        self.key.clear();
        self.value.clear();
        self.ttl = Duration::ZERO;
    }

    /// Returns `true` if every field is cleared.
    pub fn is_reset(&self) -> bool {
        self.key.is_empty() && self.value.is_empty() && self.ttl.is_zero()
    }
}

// Values may carry session payloads, so they are never printed.
impl Debug for CacheItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheItem")
            .field("key", &self.key)
            .field("value_len", &self.value.len())
            .field("ttl", &self.ttl)
            .finish()
    }
}

/// A client for a network key-value cache.
///
/// Clients are shared by every request task, so they must be cheap to clone
/// and safe for concurrent use.
#[async_trait]
pub trait CacheClient: Clone + Send + Sync + 'static {
    /// A hard error raised by the cache or its transport.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fetch the value stored under `key`.
    ///
    /// # Implementations
    ///
    /// Implementations _must_ return `Ok(None)` when the key is unknown or
    /// expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Self::Error>;

    /// Store an item, overwriting whatever was stored under its key.
    async fn set(&self, item: &CacheItem) -> Result<(), Self::Error>;

    /// Store an item only if its key is absent.
    ///
    /// # Implementations
    ///
    /// Implementations _must_ return `Ok(false)`, and leave the existing value
    /// untouched, when the key already exists.
    async fn add(&self, item: &CacheItem) -> Result<bool, Self::Error>;

    /// Store an item only if its key is present.
    ///
    /// # Implementations
    ///
    /// Implementations _must_ return `Ok(false)`, and store nothing, when the
    /// key does not exist (or has expired).
    async fn replace(&self, item: &CacheItem) -> Result<bool, Self::Error>;

    /// Delete the value stored under `key`.
    ///
    /// # Implementations
    ///
    /// Deleting an unknown key is not an error; implementations _must_ return
    /// `Ok(false)` in that case.
    async fn delete(&self, key: &str) -> Result<bool, Self::Error>;
}
