//! Test doubles shared by the unit tests of this crate.
use std::{collections::HashMap, io, sync::Arc, time::Duration};

use async_trait::async_trait;
use mockall::mock;
use parking_lot::Mutex;
use time::OffsetDateTime;

use crate::{
    cache::{CacheClient, CacheItem},
    password::{PasswordError, PasswordHasher},
    recipe::{Recipe, RecipeId, RecipeUpdate},
    recipe_store::{RecipeQueries, RecipeStore, RecipeTransaction, StoreError},
    user::User,
    user_store::{UserQueries, UserStore},
};

mock! {
    pub Cache {}

    impl Clone for Cache {
        fn clone(&self) -> Self;
    }

    #[async_trait]
    impl CacheClient for Cache {
        type Error = io::Error;

        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, io::Error>;
        async fn set(&self, item: &CacheItem) -> Result<(), io::Error>;
        async fn add(&self, item: &CacheItem) -> Result<bool, io::Error>;
        async fn replace(&self, item: &CacheItem) -> Result<bool, io::Error>;
        async fn delete(&self, key: &str) -> Result<bool, io::Error>;
    }
}

#[derive(thiserror::Error, Debug, Clone)]
pub enum FakeStoreError {
    #[error("duplicate key value violates unique constraint")]
    UniqueViolation,

    #[error("connection reset")]
    Broken,
}

impl StoreError for FakeStoreError {
    fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation)
    }
}

#[derive(Default)]
struct State {
    rows: HashMap<RecipeId, Recipe>,
    acquire_delay: Duration,
    execute_delay: Duration,
    fail_next: Option<FakeStoreError>,
    fetches: usize,
    committed: usize,
    rolled_back: usize,
}

/// A recipe store kept in a hash map, with injectable latency and failures.
#[derive(Clone, Default)]
pub struct FakeStore {
    state: Arc<Mutex<State>>,
}

impl FakeStore {
    pub fn set_acquire_delay(&self, delay: Duration) {
        self.state.lock().acquire_delay = delay;
    }

    pub fn set_execute_delay(&self, delay: Duration) {
        self.state.lock().execute_delay = delay;
    }

    pub fn fail_next(&self, err: FakeStoreError) {
        self.state.lock().fail_next = Some(err);
    }

    pub fn fetches(&self) -> usize {
        self.state.lock().fetches
    }

    pub fn committed(&self) -> usize {
        self.state.lock().committed
    }

    pub fn rolled_back(&self) -> usize {
        self.state.lock().rolled_back
    }

    async fn statement(&self) -> Result<(), FakeStoreError> {
        let delay = self.state.lock().execute_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match self.state.lock().fail_next.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn checkout(&self, staged: bool) -> Result<FakeConn, FakeStoreError> {
        let delay = self.state.lock().acquire_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let staged = staged.then(|| self.state.lock().rows.clone());
        Ok(FakeConn {
            store: self.clone(),
            staged,
        })
    }
}

/// A connection; with `staged` set it is a transaction working on a copy.
pub struct FakeConn {
    store: FakeStore,
    staged: Option<HashMap<RecipeId, Recipe>>,
}

impl FakeConn {
    fn with_rows<T>(&mut self, f: impl FnOnce(&mut HashMap<RecipeId, Recipe>) -> T) -> T {
        match self.staged.as_mut() {
            Some(rows) => f(rows),
            None => f(&mut self.store.state.lock().rows),
        }
    }
}

#[async_trait]
impl RecipeQueries for FakeConn {
    type Error = FakeStoreError;

    async fn insert_recipe(&mut self, recipe: &Recipe) -> Result<(), Self::Error> {
        self.store.statement().await?;
        self.with_rows(|rows| {
            if rows.contains_key(&recipe.id) {
                return Err(FakeStoreError::UniqueViolation);
            }
            rows.insert(recipe.id, recipe.clone());
            Ok(())
        })
    }

    async fn fetch_recipe(&mut self, id: &RecipeId) -> Result<Option<Recipe>, Self::Error> {
        self.store.statement().await?;
        self.store.state.lock().fetches += 1;
        Ok(self.with_rows(|rows| rows.get(id).cloned()))
    }

    async fn update_recipe(
        &mut self,
        id: &RecipeId,
        expected: OffsetDateTime,
        update: &RecipeUpdate,
        updated_at: OffsetDateTime,
    ) -> Result<u64, Self::Error> {
        self.store.statement().await?;
        Ok(self.with_rows(|rows| match rows.get_mut(id) {
            Some(row) if row.updated_at == expected => {
                row.title.clone_from(&update.title);
                row.content.clone_from(&update.content);
                row.updated_at = updated_at;
                1
            }
            _ => 0,
        }))
    }

    async fn recipe_exists(&mut self, id: &RecipeId) -> Result<bool, Self::Error> {
        self.store.statement().await?;
        Ok(self.with_rows(|rows| rows.contains_key(id)))
    }

    async fn delete_recipe(&mut self, id: &RecipeId) -> Result<u64, Self::Error> {
        self.store.statement().await?;
        Ok(self.with_rows(|rows| u64::from(rows.remove(id).is_some())))
    }
}

#[async_trait]
impl RecipeTransaction for FakeConn {
    async fn commit(self) -> Result<(), Self::Error> {
        let mut state = self.store.state.lock();
        if let Some(rows) = self.staged {
            state.rows = rows;
        }
        state.committed += 1;
        Ok(())
    }

    async fn rollback(self) -> Result<(), Self::Error> {
        self.store.state.lock().rolled_back += 1;
        Ok(())
    }
}

#[async_trait]
impl RecipeStore for FakeStore {
    type Error = FakeStoreError;
    type Connection = FakeConn;
    type Transaction = FakeConn;

    async fn acquire(&self) -> Result<FakeConn, FakeStoreError> {
        self.checkout(false).await
    }

    async fn begin(&self) -> Result<FakeConn, FakeStoreError> {
        self.checkout(true).await
    }
}

/// Hashes by prefixing; anything without the prefix is unreadable.
pub struct FakeHasher;

const FAKE_HASH_PREFIX: &str = "fake$";

impl PasswordHasher for FakeHasher {
    fn hash(&self, password: &str) -> Result<String, PasswordError> {
        Ok(format!("{FAKE_HASH_PREFIX}{password}"))
    }

    fn verify(&self, password: &str, hash: &str) -> Result<bool, PasswordError> {
        let stored = hash
            .strip_prefix(FAKE_HASH_PREFIX)
            .ok_or_else(|| PasswordError::new("unreadable hash"))?;
        Ok(stored == password)
    }
}

#[derive(Default)]
struct Users {
    by_email: HashMap<String, User>,
    execute_delay: Duration,
}

/// A users table kept in a hash map.
#[derive(Clone, Default)]
pub struct FakeUserStore {
    users: Arc<Mutex<Users>>,
}

impl FakeUserStore {
    pub fn set_execute_delay(&self, delay: Duration) {
        self.users.lock().execute_delay = delay;
    }

    pub fn get(&self, email: &str) -> Option<User> {
        self.users.lock().by_email.get(email).cloned()
    }

    pub fn insert(&self, user: User) {
        self.users.lock().by_email.insert(user.email.clone(), user);
    }

    async fn statement(&self) {
        let delay = self.users.lock().execute_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl UserQueries for FakeUserStore {
    type Error = FakeStoreError;

    async fn insert_user(&mut self, user: &User) -> Result<(), FakeStoreError> {
        self.statement().await;
        let mut users = self.users.lock();
        if users.by_email.contains_key(&user.email) {
            return Err(FakeStoreError::UniqueViolation);
        }
        users.by_email.insert(user.email.clone(), user.clone());
        Ok(())
    }

    async fn fetch_user_by_email(&mut self, email: &str) -> Result<Option<User>, FakeStoreError> {
        self.statement().await;
        Ok(self.get(email))
    }
}

#[async_trait]
impl UserStore for FakeUserStore {
    type Error = FakeStoreError;
    type Connection = FakeUserStore;

    async fn acquire(&self) -> Result<FakeUserStore, FakeStoreError> {
        Ok(self.clone())
    }
}
