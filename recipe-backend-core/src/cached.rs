//! A cache-aside layer in front of [`RecipeService`].
//!
//! Reads look in the cache first and fill it on a miss. Writes go to the
//! service and then drop the cached copy. The cache is never the source of
//! truth: every cache failure is logged and the operation carries on as if
//! the cache were empty. Each cache call is bounded by a deadline, and a call
//! that misses it counts as a failure.
use std::time::Duration;

use time::OffsetDateTime;

use crate::{
    cache::{CacheClient, CacheItem},
    recipe::{NewRecipe, Recipe, RecipeId, RecipeUpdate},
    recipe_store::RecipeStore,
    service::{RecipeError, RecipeService},
    session_store::DEFAULT_CACHE_TIMEOUT,
};

/// How long a cached recipe is kept.
pub const DEFAULT_RECIPE_TTL: Duration = Duration::from_secs(60 * 15);

const KEY_PREFIX: &str = "recipe_";

/// The cache key of a recipe.
pub fn cache_key(id: &RecipeId) -> String {
    format!("{KEY_PREFIX}{id}")
}

/// Recipes served from a [`CacheClient`] when possible, from a
/// [`RecipeService`] otherwise.
#[derive(Debug, Clone)]
pub struct CachedRecipes<C, S> {
    cache: C,
    service: RecipeService<S>,
    ttl: Duration,
    timeout: Duration,
}

impl<C, S> CachedRecipes<C, S>
where
    C: CacheClient,
    S: RecipeStore,
{
    /// Put `cache` in front of `service`.
    pub fn new(cache: C, service: RecipeService<S>) -> Self {
        Self {
            cache,
            service,
            ttl: DEFAULT_RECIPE_TTL,
            timeout: DEFAULT_CACHE_TIMEOUT,
        }
    }

    /// Set how long cached recipes are kept.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the deadline for each cache call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The service behind the cache.
    pub fn service(&self) -> &RecipeService<S> {
        &self.service
    }

    /// Load a recipe, from the cache if it holds a usable copy.
    pub async fn get_by_id(&self, id: RecipeId) -> Result<Recipe, RecipeError> {
        let key = cache_key(&id);

        match tokio::time::timeout(self.timeout, self.cache.get(&key)).await {
            Err(_) => {
                tracing::warn!(recipe.id = %id, timeout = ?self.timeout, "recipe cache lookup timed out");
            }
            Ok(Ok(Some(bytes))) => match rmp_serde::from_slice::<Recipe>(&bytes) {
                Ok(recipe) => {
                    tracing::trace!(recipe.id = %id, "recipe cache hit");
                    return Ok(recipe);
                }
                Err(err) => {
                    tracing::warn!(recipe.id = %id, err = %err, "discarding undecodable cached recipe");
                }
            },
            Ok(Ok(None)) => tracing::trace!(recipe.id = %id, "recipe cache miss"),
            Ok(Err(err)) => {
                tracing::warn!(recipe.id = %id, err = %err, "recipe cache lookup failed");
            }
        }

        let recipe = self.service.get_by_id(id).await?;
        self.populate(key, &recipe).await;
        Ok(recipe)
    }

    /// Create a recipe. Nothing is cached until it is first read.
    pub async fn create(&self, new: NewRecipe) -> Result<RecipeId, RecipeError> {
        self.service.create(new).await
    }

    /// Update a recipe, then drop its cached copy.
    pub async fn update_by_id(
        &self,
        id: RecipeId,
        expected: OffsetDateTime,
        update: RecipeUpdate,
    ) -> Result<Recipe, RecipeError> {
        let recipe = self.service.update_by_id(id, expected, update).await?;
        self.invalidate(&id).await;
        Ok(recipe)
    }

    /// Delete a recipe, then drop its cached copy.
    pub async fn delete_by_id(&self, id: RecipeId) -> Result<(), RecipeError> {
        self.service.delete_by_id(id).await?;
        self.invalidate(&id).await;
        Ok(())
    }

    async fn populate(&self, key: String, recipe: &Recipe) {
        let value = match rmp_serde::to_vec(recipe) {
            Ok(value) => value,
            Err(err) => {
                tracing::error!(recipe.id = %recipe.id, err = %err, "failed to encode recipe for the cache");
                return;
            }
        };

        let item = CacheItem::new(key, value, self.ttl);
        match tokio::time::timeout(self.timeout, self.cache.set(&item)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::error!(recipe.id = %recipe.id, err = %err, "failed to cache recipe");
            }
            Err(_) => {
                tracing::error!(recipe.id = %recipe.id, timeout = ?self.timeout, "caching recipe timed out");
            }
        }
    }

    async fn invalidate(&self, id: &RecipeId) {
        match tokio::time::timeout(self.timeout, self.cache.delete(&cache_key(id))).await {
            Ok(Ok(_)) => {}
            Ok(Err(err)) => {
                tracing::error!(recipe.id = %id, err = %err, "failed to invalidate cached recipe");
            }
            Err(_) => {
                tracing::error!(recipe.id = %id, timeout = ?self.timeout, "invalidating cached recipe timed out");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use async_trait::async_trait;

    use super::*;
    use crate::testing::{FakeStore, MockCache};

    fn cookies() -> NewRecipe {
        NewRecipe {
            title: "Chocolate Cookies".to_string(),
            content: "Having all your ingredients the same temperature really helps here"
                .to_string(),
        }
    }

    fn down() -> io::Error {
        io::Error::new(io::ErrorKind::ConnectionRefused, "cache is down")
    }

    async fn seeded() -> (FakeStore, Recipe) {
        let store = FakeStore::default();
        let service = RecipeService::new(store.clone());
        let id = service.create(cookies()).await.unwrap();
        let recipe = service.get_by_id(id).await.unwrap();
        (store, recipe)
    }

    #[tokio::test]
    async fn miss_reads_the_store_and_populates() {
        let (store, recipe) = seeded().await;
        let reads_before = store.fetches();
        let key = cache_key(&recipe.id);
        let expected = recipe.clone();

        let mut cache = MockCache::new();
        cache.expect_get().times(1).returning(|_| Ok(None));
        cache
            .expect_set()
            .withf(move |item| {
                item.key == key
                    && item.ttl == DEFAULT_RECIPE_TTL
                    && rmp_serde::from_slice::<Recipe>(&item.value).unwrap() == expected
            })
            .times(1)
            .returning(|_| Ok(()));

        let recipes = CachedRecipes::new(cache, RecipeService::new(store.clone()));
        assert_eq!(recipes.get_by_id(recipe.id).await.unwrap(), recipe);
        assert_eq!(store.fetches(), reads_before + 1);
    }

    #[tokio::test]
    async fn hit_skips_the_store() {
        let (store, recipe) = seeded().await;
        let reads_before = store.fetches();
        let cached = rmp_serde::to_vec(&recipe).unwrap();

        let mut cache = MockCache::new();
        cache
            .expect_get()
            .times(1)
            .returning(move |_| Ok(Some(cached.clone())));
        cache.expect_set().never();

        let recipes = CachedRecipes::new(cache, RecipeService::new(store.clone()));
        assert_eq!(recipes.get_by_id(recipe.id).await.unwrap(), recipe);
        assert_eq!(store.fetches(), reads_before);
    }

    #[tokio::test]
    async fn undecodable_entry_falls_through_to_the_store() {
        let (store, recipe) = seeded().await;

        let mut cache = MockCache::new();
        cache
            .expect_get()
            .returning(|_| Ok(Some(b"not msgpack".to_vec())));
        cache.expect_set().times(1).returning(|_| Ok(()));

        let recipes = CachedRecipes::new(cache, RecipeService::new(store));
        assert_eq!(recipes.get_by_id(recipe.id).await.unwrap(), recipe);
    }

    #[tokio::test]
    async fn cache_outage_does_not_fail_reads() {
        let (store, recipe) = seeded().await;

        let mut cache = MockCache::new();
        cache.expect_get().returning(|_| Err(down()));
        cache.expect_set().returning(|_| Err(down()));

        let recipes = CachedRecipes::new(cache, RecipeService::new(store));
        assert_eq!(recipes.get_by_id(recipe.id).await.unwrap(), recipe);
    }

    #[tokio::test]
    async fn writes_invalidate_even_when_the_cache_fails() {
        let (store, recipe) = seeded().await;
        let key = cache_key(&recipe.id);

        let mut cache = MockCache::new();
        cache
            .expect_delete()
            .withf(move |k| k == key)
            .times(2)
            .returning(|_| Err(down()));

        let recipes = CachedRecipes::new(cache, RecipeService::new(store));
        let update = RecipeUpdate {
            title: "Brown Butter Cookies".to_string(),
            content: recipe.content.clone(),
        };
        recipes
            .update_by_id(recipe.id, recipe.updated_at, update)
            .await
            .unwrap();
        recipes.delete_by_id(recipe.id).await.unwrap();
    }

    #[tokio::test]
    async fn failed_writes_leave_the_cache_alone() {
        let (store, recipe) = seeded().await;

        let mut cache = MockCache::new();
        cache.expect_delete().never();

        let recipes = CachedRecipes::new(cache, RecipeService::new(store));
        let stale = recipe.updated_at - time::Duration::seconds(1);
        let update = RecipeUpdate {
            title: "Stale".to_string(),
            content: "Stale content".to_string(),
        };
        let err = recipes
            .update_by_id(recipe.id, stale, update)
            .await
            .unwrap_err();
        assert!(matches!(err, RecipeError::Conflict));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_cache_does_not_block_the_store() {
        #[derive(Clone)]
        struct Stalled;

        #[async_trait]
        impl CacheClient for Stalled {
            type Error = io::Error;

            async fn get(&self, _: &str) -> Result<Option<Vec<u8>>, io::Error> {
                std::future::pending().await
            }
            async fn set(&self, _: &CacheItem) -> Result<(), io::Error> {
                std::future::pending().await
            }
            async fn add(&self, _: &CacheItem) -> Result<bool, io::Error> {
                std::future::pending().await
            }
            async fn replace(&self, _: &CacheItem) -> Result<bool, io::Error> {
                std::future::pending().await
            }
            async fn delete(&self, _: &str) -> Result<bool, io::Error> {
                std::future::pending().await
            }
        }

        let (store, recipe) = seeded().await;
        let recipes = CachedRecipes::new(Stalled, RecipeService::new(store.clone()))
            .with_timeout(Duration::from_millis(50));
        let outer = Duration::from_secs(60);

        let read = tokio::time::timeout(outer, recipes.get_by_id(recipe.id))
            .await
            .expect("read is bounded by the cache deadline");
        assert_eq!(read.unwrap(), recipe);

        let update = RecipeUpdate {
            title: "Brown Butter Cookies".to_string(),
            content: recipe.content.clone(),
        };
        let updated = tokio::time::timeout(
            outer,
            recipes.update_by_id(recipe.id, recipe.updated_at, update),
        )
        .await
        .expect("update is bounded by the cache deadline")
        .unwrap();
        assert_eq!(updated.title, "Brown Butter Cookies");
        assert_eq!(store.committed(), 1);

        tokio::time::timeout(outer, recipes.delete_by_id(recipe.id))
            .await
            .expect("delete is bounded by the cache deadline")
            .unwrap();
    }

    #[tokio::test]
    async fn store_errors_are_not_cached() {
        let (store, recipe) = seeded().await;
        store.fail_next(crate::testing::FakeStoreError::Broken);

        let mut cache = MockCache::new();
        cache.expect_get().returning(|_| Ok(None));
        cache.expect_set().never();

        let recipes = CachedRecipes::new(cache, RecipeService::new(store));
        let err = recipes.get_by_id(recipe.id).await.unwrap_err();
        assert!(matches!(err, RecipeError::Unexpected(_)));
    }
}
