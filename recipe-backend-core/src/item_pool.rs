//! A pool of reusable [`CacheItem`] buffers.
//!
//! Writing a session to the cache needs a key buffer and a value buffer. The
//! pool keeps a few cleared items around so those buffers are reused instead
//! of reallocated on every call.
//!
//! Items may have held another visitor's session, so an item is always reset
//! before it goes back to the pool. That happens in the [`Drop`] impl of
//! [`PooledItem`], which runs on every exit path: normal return, early `?`
//! return, a cancelled future, or a panic.
use std::{
    fmt,
    ops::{Deref, DerefMut},
    sync::Arc,
};

use parking_lot::Mutex;

use crate::cache::CacheItem;

const DEFAULT_MAX_IDLE: usize = 64;

/// A pool of reusable [`CacheItem`]s.
///
/// Cloning the pool is cheap; clones share the same idle items.
///
/// # Examples
///
/// ```rust
/// use recipe_backend_core::ItemPool;
///
/// let pool = ItemPool::default();
/// {
///     let mut item = pool.acquire();
///     item.key.push_str("session-token");
///     item.value.extend_from_slice(b"{}");
/// }
/// // The item was cleared on release.
/// assert!(pool.acquire().is_reset());
/// ```
#[derive(Clone)]
pub struct ItemPool {
    idle: Arc<Mutex<Vec<CacheItem>>>,
    max_idle: usize,
}

impl ItemPool {
    /// Create a pool that retains at most `max_idle` released items.
    pub fn new(max_idle: usize) -> Self {
        Self {
            idle: Arc::new(Mutex::new(Vec::with_capacity(max_idle))),
            max_idle,
        }
    }

    /// Borrow a cleared item from the pool, allocating one if none is idle.
    pub fn acquire(&self) -> PooledItem<'_> {
        let item = self.idle.lock().pop().unwrap_or_default();
        debug_assert!(item.is_reset(), "pooled items are reset on release");

        PooledItem {
            pool: self,
            item: Some(item),
        }
    }

    /// The number of idle items currently retained.
    pub fn idle_len(&self) -> usize {
        self.idle.lock().len()
    }

    fn release(&self, mut item: CacheItem) {
        item.reset();

        let mut idle = self.idle.lock();
        if idle.len() < self.max_idle {
            idle.push(item);
        }
    }
}

impl Default for ItemPool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_IDLE)
    }
}

impl fmt::Debug for ItemPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ItemPool")
            .field("idle", &self.idle_len())
            .field("max_idle", &self.max_idle)
            .finish()
    }
}

/// A [`CacheItem`] on loan from an [`ItemPool`].
///
/// The item is reset and returned to its pool when this guard is dropped.
pub struct PooledItem<'a> {
    pool: &'a ItemPool,
    item: Option<CacheItem>,
}

impl Deref for PooledItem<'_> {
    type Target = CacheItem;

    fn deref(&self) -> &Self::Target {
        self.item.as_ref().expect("item is present until drop")
    }
}

impl DerefMut for PooledItem<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.item.as_mut().expect("item is present until drop")
    }
}

impl fmt::Debug for PooledItem<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PooledItem").field(&**self).finish()
    }
}

impl Drop for PooledItem<'_> {
    fn drop(&mut self) {
        if let Some(item) = self.item.take() {
            self.pool.release(item);
        }
    }
}
