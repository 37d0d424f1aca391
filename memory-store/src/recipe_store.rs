use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use recipe_backend_core::{
    Recipe, RecipeId, RecipeQueries, RecipeStore, RecipeTransaction, RecipeUpdate, StoreError,
};
use time::OffsetDateTime;
use tokio::sync::{AcquireError, Mutex, OwnedMutexGuard, OwnedSemaphorePermit, Semaphore};

type Table = HashMap<RecipeId, Recipe>;

const DEFAULT_MAX_CONNECTIONS: usize = 25;

/// An error type for [`MemoryRecipeStore`].
#[derive(thiserror::Error, Debug)]
pub enum MemoryStoreError {
    /// A row with this id already exists.
    #[error("duplicate recipe id {0}")]
    UniqueViolation(RecipeId),

    /// An account with this email already exists.
    #[error("duplicate email")]
    DuplicateEmail,

    /// The connection limit was closed.
    #[error("connection pool closed: {0}")]
    Closed(#[from] AcquireError),
}

impl StoreError for MemoryStoreError {
    fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation(_) | Self::DuplicateEmail)
    }
}

/// A recipe store that lives only in memory.
///
/// Connections are limited like a real pool, and a transaction holds the
/// whole table until it ends: its writes are staged on a copy and only
/// become visible on commit. Dropping a transaction discards them.
///
/// # Examples
///
/// ```rust
/// use recipe_backend_memory_store::MemoryRecipeStore;
/// MemoryRecipeStore::default();
/// ```
#[derive(Clone, Debug)]
pub struct MemoryRecipeStore {
    table: Arc<Mutex<Table>>,
    connections: Arc<Semaphore>,
    latency: Duration,
}

impl Default for MemoryRecipeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRecipeStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            table: Arc::default(),
            connections: Arc::new(Semaphore::new(DEFAULT_MAX_CONNECTIONS)),
            latency: Duration::ZERO,
        }
    }

    /// Limit how many connections may be checked out at once.
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.connections = Arc::new(Semaphore::new(max));
        self
    }

    /// Delay every statement by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// The number of stored recipes.
    pub async fn len(&self) -> usize {
        self.table.lock().await.len()
    }

    /// Returns `true` if no recipe is stored.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn permit(&self) -> Result<OwnedSemaphorePermit, MemoryStoreError> {
        Ok(self.connections.clone().acquire_owned().await?)
    }
}

pub(crate) async fn simulate(latency: Duration) {
    if !latency.is_zero() {
        tokio::time::sleep(latency).await;
    }
}

/// A connection checked out of a [`MemoryRecipeStore`].
#[derive(Debug)]
pub struct MemoryConnection {
    table: Arc<Mutex<Table>>,
    latency: Duration,
    _permit: OwnedSemaphorePermit,
}

/// A transaction on a [`MemoryRecipeStore`].
#[derive(Debug)]
pub struct MemoryTransaction {
    table: OwnedMutexGuard<Table>,
    staged: Table,
    latency: Duration,
    _permit: OwnedSemaphorePermit,
}

fn insert(table: &mut Table, recipe: &Recipe) -> Result<(), MemoryStoreError> {
    if table.contains_key(&recipe.id) {
        return Err(MemoryStoreError::UniqueViolation(recipe.id));
    }
    table.insert(recipe.id, recipe.clone());
    Ok(())
}

fn update(
    table: &mut Table,
    id: &RecipeId,
    expected: OffsetDateTime,
    fields: &RecipeUpdate,
    updated_at: OffsetDateTime,
) -> u64 {
    match table.get_mut(id) {
        Some(row) if row.updated_at == expected => {
            row.title.clone_from(&fields.title);
            row.content.clone_from(&fields.content);
            row.updated_at = updated_at;
            1
        }
        _ => 0,
    }
}

#[async_trait]
impl RecipeQueries for MemoryConnection {
    type Error = MemoryStoreError;

    async fn insert_recipe(&mut self, recipe: &Recipe) -> Result<(), Self::Error> {
        simulate(self.latency).await;
        insert(&mut *self.table.lock().await, recipe)
    }

    async fn fetch_recipe(&mut self, id: &RecipeId) -> Result<Option<Recipe>, Self::Error> {
        simulate(self.latency).await;
        Ok(self.table.lock().await.get(id).cloned())
    }

    async fn update_recipe(
        &mut self,
        id: &RecipeId,
        expected: OffsetDateTime,
        fields: &RecipeUpdate,
        updated_at: OffsetDateTime,
    ) -> Result<u64, Self::Error> {
        simulate(self.latency).await;
        Ok(update(
            &mut *self.table.lock().await,
            id,
            expected,
            fields,
            updated_at,
        ))
    }

    async fn recipe_exists(&mut self, id: &RecipeId) -> Result<bool, Self::Error> {
        simulate(self.latency).await;
        Ok(self.table.lock().await.contains_key(id))
    }

    async fn delete_recipe(&mut self, id: &RecipeId) -> Result<u64, Self::Error> {
        simulate(self.latency).await;
        Ok(u64::from(self.table.lock().await.remove(id).is_some()))
    }
}

#[async_trait]
impl RecipeQueries for MemoryTransaction {
    type Error = MemoryStoreError;

    async fn insert_recipe(&mut self, recipe: &Recipe) -> Result<(), Self::Error> {
        simulate(self.latency).await;
        insert(&mut self.staged, recipe)
    }

    async fn fetch_recipe(&mut self, id: &RecipeId) -> Result<Option<Recipe>, Self::Error> {
        simulate(self.latency).await;
        Ok(self.staged.get(id).cloned())
    }

    async fn update_recipe(
        &mut self,
        id: &RecipeId,
        expected: OffsetDateTime,
        fields: &RecipeUpdate,
        updated_at: OffsetDateTime,
    ) -> Result<u64, Self::Error> {
        simulate(self.latency).await;
        Ok(update(&mut self.staged, id, expected, fields, updated_at))
    }

    async fn recipe_exists(&mut self, id: &RecipeId) -> Result<bool, Self::Error> {
        simulate(self.latency).await;
        Ok(self.staged.contains_key(id))
    }

    async fn delete_recipe(&mut self, id: &RecipeId) -> Result<u64, Self::Error> {
        simulate(self.latency).await;
        Ok(u64::from(self.staged.remove(id).is_some()))
    }
}

#[async_trait]
impl RecipeTransaction for MemoryTransaction {
    async fn commit(mut self) -> Result<(), Self::Error> {
        *self.table = std::mem::take(&mut self.staged);
        tracing::trace!("committed memory transaction");
        Ok(())
    }

    async fn rollback(self) -> Result<(), Self::Error> {
        tracing::trace!("rolled back memory transaction");
        Ok(())
    }
}

#[async_trait]
impl RecipeStore for MemoryRecipeStore {
    type Error = MemoryStoreError;
    type Connection = MemoryConnection;
    type Transaction = MemoryTransaction;

    async fn acquire(&self) -> Result<MemoryConnection, MemoryStoreError> {
        let permit = self.permit().await?;
        Ok(MemoryConnection {
            table: self.table.clone(),
            latency: self.latency,
            _permit: permit,
        })
    }

    async fn begin(&self) -> Result<MemoryTransaction, MemoryStoreError> {
        let permit = self.permit().await?;
        let table = self.table.clone().lock_owned().await;
        let staged = table.clone();
        Ok(MemoryTransaction {
            table,
            staged,
            latency: self.latency,
            _permit: permit,
        })
    }
}
