//! The relational store holding recipes.
//!
//! The store is described by three traits. [`RecipeStore`] hands out
//! connections and transactions, [`RecipeQueries`] runs single statements on
//! either of them, and [`RecipeTransaction`] ends a transaction.
//!
//! # Implementing a store
//!
//! Query methods report "no rows" through their `Ok` value (`None`, `false` or
//! a zero count); `Err(...)` is reserved for hard failures. Write statements
//! return the number of rows they affected.
//!
//! A transaction that is dropped without being committed _must_ be rolled
//! back. Callers rely on this when an operation is cancelled.
use async_trait::async_trait;
use time::OffsetDateTime;

use crate::recipe::{Recipe, RecipeId, RecipeUpdate};

/// A hard error raised by a store.
pub trait StoreError: std::error::Error + Send + Sync + 'static {
    /// Returns `true` if a write was rejected because it would duplicate a
    /// unique key.
    fn is_unique_violation(&self) -> bool;
}

/// Statements that can run on a connection or inside a transaction.
#[async_trait]
pub trait RecipeQueries: Send {
    /// The error raised by the store.
    type Error: StoreError;

    /// Insert a new row.
    async fn insert_recipe(&mut self, recipe: &Recipe) -> Result<(), Self::Error>;

    /// Fetch a row by id.
    async fn fetch_recipe(&mut self, id: &RecipeId) -> Result<Option<Recipe>, Self::Error>;

    /// Overwrite the title and content of a row, only if its `updated_at` is
    /// still `expected`, and set its `updated_at` to `updated_at`.
    ///
    /// Returns the number of rows affected.
    async fn update_recipe(
        &mut self,
        id: &RecipeId,
        expected: OffsetDateTime,
        update: &RecipeUpdate,
        updated_at: OffsetDateTime,
    ) -> Result<u64, Self::Error>;

    /// Returns `true` if a row with this id exists.
    async fn recipe_exists(&mut self, id: &RecipeId) -> Result<bool, Self::Error>;

    /// Delete a row by id, returning the number of rows affected.
    async fn delete_recipe(&mut self, id: &RecipeId) -> Result<u64, Self::Error>;
}

/// An open transaction.
#[async_trait]
pub trait RecipeTransaction: RecipeQueries {
    /// Make every statement run in the transaction durable.
    async fn commit(self) -> Result<(), Self::Error>;

    /// Discard every statement run in the transaction.
    async fn rollback(self) -> Result<(), Self::Error>;
}

/// A pool of connections to the relational store.
///
/// Stores are shared by every request task and must be cheap to clone.
#[async_trait]
pub trait RecipeStore: Clone + Send + Sync + 'static {
    /// The error raised by the store.
    type Error: StoreError;

    /// A checked-out connection; it returns to the pool when dropped.
    type Connection: RecipeQueries<Error = Self::Error>;

    /// An open transaction on a checked-out connection.
    type Transaction: RecipeTransaction<Error = Self::Error>;

    /// Check out a connection.
    async fn acquire(&self) -> Result<Self::Connection, Self::Error>;

    /// Check out a connection and begin a transaction on it.
    async fn begin(&self) -> Result<Self::Transaction, Self::Error>;
}
