use async_trait::async_trait;
pub use redis;
use recipe_backend_core::cache::{is_valid_key, CacheClient, CacheItem};
use redis::{aio::ConnectionManager, Cmd};

/// An error type for [`RedisCache`].
#[derive(thiserror::Error, Debug)]
pub enum RedisCacheError {
    /// A variant to map to `redis::RedisError` errors.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// The key would be refused by some cache transports.
    #[error("invalid cache key: {0:?}")]
    InvalidKey(String),
}

/// A cache client backed by Redis.
///
/// Conditional writes map onto `SET` options: `add` is `SET .. NX`, and
/// `replace` is `SET .. XX`. TTLs are sent as whole seconds with `EX`.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    /// Create a new Redis cache over the provided connection manager.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use recipe_backend_redis_store::RedisCache;
    ///
    /// # async fn connect() -> redis::RedisResult<()> {
    /// let client = redis::Client::open("redis://127.0.0.1:6379")?;
    /// let cache = RedisCache::new(client.get_connection_manager().await?);
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Connect to the Redis server at `url`.
    pub async fn connect(url: &str) -> Result<Self, RedisCacheError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        tracing::info!("connected to redis");
        Ok(Self::new(conn))
    }
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache").finish_non_exhaustive()
    }
}

fn check_key(key: &str) -> Result<(), RedisCacheError> {
    if is_valid_key(key) {
        Ok(())
    } else {
        Err(RedisCacheError::InvalidKey(key.to_string()))
    }
}

/// `SET key value [EX secs]`; a zero TTL stores without expiry.
fn set_cmd(item: &CacheItem) -> Cmd {
    let mut cmd = redis::cmd("SET");
    cmd.arg(&item.key).arg(item.value.as_slice());
    let secs = item.ttl_secs();
    if secs > 0 {
        cmd.arg("EX").arg(secs);
    }
    cmd
}

#[async_trait]
impl CacheClient for RedisCache {
    type Error = RedisCacheError;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Self::Error> {
        check_key(key)?;
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn set(&self, item: &CacheItem) -> Result<(), Self::Error> {
        check_key(&item.key)?;
        let mut conn = self.conn.clone();
        let _: () = set_cmd(item).query_async(&mut conn).await?;
        Ok(())
    }

    async fn add(&self, item: &CacheItem) -> Result<bool, Self::Error> {
        check_key(&item.key)?;
        let mut conn = self.conn.clone();
        let reply: Option<String> = set_cmd(item).arg("NX").query_async(&mut conn).await?;
        Ok(reply.is_some())
    }

    async fn replace(&self, item: &CacheItem) -> Result<bool, Self::Error> {
        check_key(&item.key)?;
        let mut conn = self.conn.clone();
        let reply: Option<String> = set_cmd(item).arg("XX").query_async(&mut conn).await?;
        Ok(reply.is_some())
    }

    async fn delete(&self, key: &str) -> Result<bool, Self::Error> {
        check_key(key)?;
        let mut conn = self.conn.clone();
        let removed: u64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn set_carries_the_ttl_in_seconds() {
        let item = CacheItem::new("recipe_1", b"v".to_vec(), Duration::from_millis(1500));
        let packed = String::from_utf8_lossy(&set_cmd(&item).get_packed_command()).into_owned();
        assert!(packed.contains("SET"));
        assert!(packed.contains("EX"));
        assert!(packed.ends_with("$1\r\n2\r\n"));
    }

    #[test]
    fn zero_ttl_has_no_expiry() {
        let item = CacheItem::new("k", b"v".to_vec(), Duration::ZERO);
        let packed = String::from_utf8_lossy(&set_cmd(&item).get_packed_command()).into_owned();
        assert!(!packed.contains("EX"));
    }

    async fn live_cache() -> Option<RedisCache> {
        let url = std::env::var("REDIS_URL").ok()?;
        Some(RedisCache::connect(&url).await.unwrap())
    }

    #[tokio::test]
    async fn conditional_writes_against_a_live_server() {
        let Some(cache) = live_cache().await else {
            return;
        };
        let key = format!("recipe-backend-test-{}", std::process::id());
        let item = CacheItem::new(key.clone(), b"first".to_vec(), Duration::from_secs(30));

        cache.delete(&key).await.unwrap();
        assert!(!cache.replace(&item).await.unwrap());
        assert!(cache.add(&item).await.unwrap());
        assert!(!cache.add(&item).await.unwrap());
        assert_eq!(cache.get(&key).await.unwrap().unwrap(), b"first");
        assert!(cache.delete(&key).await.unwrap());
        assert!(!cache.delete(&key).await.unwrap());
        assert!(cache.get(&key).await.unwrap().is_none());
    }
}
