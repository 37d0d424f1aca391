//! Opaque-token sessions kept in a remote cache.
//!
//! A session is a serializable payload stored under a random [`Token`]. The
//! token is handed to the visitor (usually as a cookie) and is the only thing
//! the application keeps; the payload lives in the cache and expires there.
//!
//! Creating and refreshing a session map onto different cache primitives:
//! [`SessionStore::create`] uses `add`, which refuses to overwrite an existing
//! key, and [`SessionStore::update`] uses `replace`, which refuses to create a
//! missing one. A token collision therefore surfaces as an error instead of
//! silently taking over another visitor's session, and a refresh can never
//! resurrect a session that was deleted or has expired.
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};

use crate::{
    cache::CacheClient,
    item_pool::{ItemPool, PooledItem},
    token::Token,
};

/// How long a session lives after it is created.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(86_400 * 14);

/// How long a single cache call may take before it is abandoned.
pub const DEFAULT_CACHE_TIMEOUT: Duration = Duration::from_secs(1);

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Why a session could not be created.
#[derive(thiserror::Error, Debug)]
pub enum CreationFailure {
    /// The generated token is already in use.
    #[error("session token already exists")]
    Collision,

    /// The payload could not be serialized.
    #[error("failed to encode session payload: {0}")]
    Encode(#[source] serde_json::Error),

    /// The cache rejected the write or could not be reached.
    #[error("cache error: {0}")]
    Cache(#[source] BoxError),

    /// The cache did not answer in time.
    #[error("cache did not respond within {0:?}")]
    Timeout(Duration),
}

/// An error type for [`SessionStore`].
#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    /// The token is unknown or its session expired.
    ///
    /// This is an expected condition: callers usually fall back to an
    /// anonymous session.
    #[error("session not found")]
    NotFound,

    /// A new session could not be stored.
    #[error("failed to create session: {0}")]
    CreationFailed(#[from] CreationFailure),

    /// The cache returned bytes that are not a valid payload.
    #[error("failed to decode session payload: {0}")]
    Decode(#[source] serde_json::Error),

    /// The payload could not be serialized.
    #[error("failed to encode session payload: {0}")]
    Encode(#[source] serde_json::Error),

    /// The cache failed.
    #[error("cache error: {0}")]
    Cache(#[source] BoxError),

    /// The cache did not answer in time.
    #[error("cache did not respond within {0:?}")]
    Timeout(Duration),
}

impl SessionError {
    fn cache<E: std::error::Error + Send + Sync + 'static>(err: E) -> Self {
        Self::Cache(Box::new(err))
    }
}

/// Issues, reads and revokes sessions stored in a [`CacheClient`].
///
/// # Examples
///
/// ```rust,ignore
/// use recipe_backend_core::SessionStore;
///
/// let sessions = SessionStore::new(cache);
/// let token = sessions.create(&payload).await?;
/// let payload: Payload = sessions.get(&token).await?;
/// sessions.delete(&token).await?;
/// ```
#[derive(Debug, Clone)]
pub struct SessionStore<C> {
    cache: C,
    items: ItemPool,
    ttl: Duration,
    timeout: Duration,
}

impl<C: CacheClient> SessionStore<C> {
    /// Create a session store over the provided cache client.
    pub fn new(cache: C) -> Self {
        Self {
            cache,
            items: ItemPool::default(),
            ttl: DEFAULT_SESSION_TTL,
            timeout: DEFAULT_CACHE_TIMEOUT,
        }
    }

    /// Set how long newly created sessions live.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the deadline for each cache call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// How long newly created sessions live.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The underlying cache client.
    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// Store `payload` under a freshly generated token and return the token.
    ///
    /// # Errors
    ///
    /// Fails with [`SessionError::CreationFailed`] if the token is already
    /// taken, the payload cannot be encoded, or the cache fails or times out.
    pub async fn create<P>(&self, payload: &P) -> Result<Token, SessionError>
    where
        P: Serialize + ?Sized,
    {
        let token = Token::generate();

        let mut item = self.items.acquire();
        fill_item(&mut item, &token, payload, self.ttl).map_err(CreationFailure::Encode)?;

        let added = tokio::time::timeout(self.timeout, self.cache.add(&item))
            .await
            .map_err(|_| CreationFailure::Timeout(self.timeout))?
            .map_err(|err| CreationFailure::Cache(Box::new(err)))?;

        if !added {
            tracing::warn!("session token collision");
            return Err(CreationFailure::Collision.into());
        }

        tracing::debug!("created session");
        Ok(token)
    }

    /// Load the payload stored for `token`.
    ///
    /// # Errors
    ///
    /// - [`SessionError::NotFound`] if the token is unknown or expired.
    /// - [`SessionError::Decode`] if the stored bytes are not a `P`.
    /// - [`SessionError::Cache`] or [`SessionError::Timeout`] if the cache
    ///   fails.
    pub async fn get<P>(&self, token: &Token) -> Result<P, SessionError>
    where
        P: DeserializeOwned,
    {
        let key = token.to_string();
        let value = tokio::time::timeout(self.timeout, self.cache.get(&key))
            .await
            .map_err(|_| SessionError::Timeout(self.timeout))?
            .map_err(SessionError::cache)?
            .ok_or(SessionError::NotFound)?;

        serde_json::from_slice(&value).map_err(SessionError::Decode)
    }

    /// Replace the payload and lifetime of an existing session.
    ///
    /// This never creates a session.
    ///
    /// # Errors
    ///
    /// Fails with [`SessionError::NotFound`] if the session does not exist.
    pub async fn update<P>(&self, token: &Token, payload: &P, ttl: Duration) -> Result<(), SessionError>
    where
        P: Serialize + ?Sized,
    {
        let mut item = self.items.acquire();
        fill_item(&mut item, token, payload, ttl).map_err(SessionError::Encode)?;

        let replaced = tokio::time::timeout(self.timeout, self.cache.replace(&item))
            .await
            .map_err(|_| SessionError::Timeout(self.timeout))?
            .map_err(SessionError::cache)?;

        if replaced {
            Ok(())
        } else {
            Err(SessionError::NotFound)
        }
    }

    /// Revoke a session.
    ///
    /// Revoking an unknown or expired session is not an error.
    pub async fn delete(&self, token: &Token) -> Result<(), SessionError> {
        let key = token.to_string();
        let existed = tokio::time::timeout(self.timeout, self.cache.delete(&key))
            .await
            .map_err(|_| SessionError::Timeout(self.timeout))?
            .map_err(SessionError::cache)?;

        tracing::debug!(existed, "deleted session");
        Ok(())
    }
}

fn fill_item<P>(
    item: &mut PooledItem<'_>,
    token: &Token,
    payload: &P,
    ttl: Duration,
) -> Result<(), serde_json::Error>
where
    P: Serialize + ?Sized,
{
    item.key.push_str(&token.to_string());
    serde_json::to_writer(&mut item.value, payload)?;
    item.ttl = ttl;
    Ok(())
}
