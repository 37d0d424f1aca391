//! Recipe operations over a [`RecipeStore`], with optimistic concurrency.
//!
//! Every recipe carries an `updated_at` timestamp that doubles as its version.
//! An update names the version it was based on and is applied only if that is
//! still the current one; otherwise the caller gets
//! [`RecipeError::Conflict`] and has to re-read.
use std::{future::Future, time::Duration};

use time::OffsetDateTime;

use crate::{
    recipe::{next_version, now_version, NewRecipe, Recipe, RecipeId, RecipeUpdate},
    recipe_store::{RecipeQueries, RecipeStore, RecipeTransaction, StoreError},
};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Which part of an operation ran out of time.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TimeoutStage {
    /// Checking out a connection or beginning a transaction.
    Acquire,

    /// Running a statement, or committing.
    Execute,
}

/// An error type for [`RecipeService`].
#[derive(thiserror::Error, Debug)]
pub enum RecipeError {
    /// No recipe has the requested id.
    #[error("recipe not found")]
    NotFound,

    /// The recipe changed since the version the caller based its update on.
    #[error("recipe was modified concurrently")]
    Conflict,

    /// The store did not answer within the budget.
    #[error("store timed out during {0:?}")]
    Timeout(TimeoutStage),

    /// Any other failure.
    #[error("unexpected store error: {0}")]
    Unexpected(#[source] BoxError),
}

/// Deadlines for each stage of a store operation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Budget {
    /// Deadline for checking out a connection.
    pub acquire: Duration,

    /// Deadline for each statement.
    pub execute: Duration,
}

impl Default for Budget {
    fn default() -> Self {
        Self {
            acquire: Duration::from_secs(3),
            execute: Duration::from_secs(3),
        }
    }
}

/// Creates, reads, updates and deletes recipes.
#[derive(Debug, Clone)]
pub struct RecipeService<S> {
    store: S,
    budget: Budget,
}

impl<S: RecipeStore> RecipeService<S> {
    /// Create a service with the default [`Budget`].
    pub fn new(store: S) -> Self {
        Self {
            store,
            budget: Budget::default(),
        }
    }

    /// Replace the timeout budget.
    pub fn with_budget(mut self, budget: Budget) -> Self {
        self.budget = budget;
        self
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Store a new recipe and return its id.
    ///
    /// The id and both timestamps are generated here, so `created_at` and
    /// `updated_at` of a new recipe are equal.
    pub async fn create(&self, new: NewRecipe) -> Result<RecipeId, RecipeError> {
        let now = now_version();
        let recipe = Recipe {
            id: RecipeId::generate(),
            title: new.title,
            content: new.content,
            created_at: now,
            updated_at: now,
        };

        let mut conn = self.acquire(self.store.acquire()).await?;
        match self.execute(conn.insert_recipe(&recipe)).await {
            Ok(()) => {
                tracing::debug!(recipe.id = %recipe.id, "created recipe");
                Ok(recipe.id)
            }
            Err(Failure::Store(err)) if err.is_unique_violation() => {
                tracing::error!(recipe.id = %recipe.id, err = %err, "generated recipe id already exists");
                Err(RecipeError::Unexpected(Box::new(err)))
            }
            Err(failure) => Err(failure.into()),
        }
    }

    /// Load a recipe.
    pub async fn get_by_id(&self, id: RecipeId) -> Result<Recipe, RecipeError> {
        let mut conn = self.acquire(self.store.acquire()).await?;
        self.execute(conn.fetch_recipe(&id))
            .await?
            .ok_or(RecipeError::NotFound)
    }

    /// Overwrite a recipe if it is still at version `expected`.
    ///
    /// On success the new state is returned; its `updated_at` is strictly
    /// greater than `expected`.
    ///
    /// # Errors
    ///
    /// - [`RecipeError::NotFound`] if no recipe has this id.
    /// - [`RecipeError::Conflict`] if it exists at another version. Nothing is
    ///   written.
    pub async fn update_by_id(
        &self,
        id: RecipeId,
        expected: OffsetDateTime,
        update: RecipeUpdate,
    ) -> Result<Recipe, RecipeError> {
        let mut tx = self.acquire(self.store.begin()).await?;

        match self.apply_update(&mut tx, &id, expected, &update).await {
            Ok(recipe) => {
                self.execute(tx.commit()).await?;
                tracing::debug!(recipe.id = %id, "updated recipe");
                Ok(recipe)
            }
            Err(err) => {
                self.rollback(tx, &id).await;
                Err(err)
            }
        }
    }

    /// Delete a recipe. Deleting a missing recipe succeeds.
    pub async fn delete_by_id(&self, id: RecipeId) -> Result<(), RecipeError> {
        let mut conn = self.acquire(self.store.acquire()).await?;
        let deleted = self.execute(conn.delete_recipe(&id)).await?;
        tracing::debug!(recipe.id = %id, deleted, "deleted recipe");
        Ok(())
    }

    async fn apply_update(
        &self,
        tx: &mut S::Transaction,
        id: &RecipeId,
        expected: OffsetDateTime,
        update: &RecipeUpdate,
    ) -> Result<Recipe, RecipeError> {
        let updated_at = next_version(expected);
        let rows = self
            .execute(tx.update_recipe(id, expected, update, updated_at))
            .await?;

        if rows == 0 {
            return if self.execute(tx.recipe_exists(id)).await? {
                Err(RecipeError::Conflict)
            } else {
                Err(RecipeError::NotFound)
            };
        }

        // Read back inside the transaction for `created_at`.
        self.execute(tx.fetch_recipe(id))
            .await?
            .ok_or(RecipeError::NotFound)
    }

    async fn rollback(&self, tx: S::Transaction, id: &RecipeId) {
        if let Err(failure) = self.execute(tx.rollback()).await {
            tracing::error!(recipe.id = %id, err = %failure, "failed to roll back transaction");
        }
    }

    async fn acquire<T, F>(&self, fut: F) -> Result<T, RecipeError>
    where
        F: Future<Output = Result<T, S::Error>>,
    {
        Ok(bounded(self.budget.acquire, TimeoutStage::Acquire, fut).await?)
    }

    async fn execute<T, F>(&self, fut: F) -> Result<T, Failure<S::Error>>
    where
        F: Future<Output = Result<T, S::Error>>,
    {
        bounded(self.budget.execute, TimeoutStage::Execute, fut).await
    }
}

/// Run `fut` with a deadline of `limit`, attributing a timeout to `stage`.
pub(crate) async fn bounded<T, E, F>(
    limit: Duration,
    stage: TimeoutStage,
    fut: F,
) -> Result<T, Failure<E>>
where
    F: Future<Output = Result<T, E>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| Failure::Timeout(stage))?
        .map_err(Failure::Store)
}

/// A store failure before it is classified.
#[derive(thiserror::Error, Debug)]
pub(crate) enum Failure<E> {
    #[error("store error: {0}")]
    Store(E),

    #[error("timed out during {0:?}")]
    Timeout(TimeoutStage),
}

impl<E: StoreError> From<Failure<E>> for RecipeError {
    fn from(failure: Failure<E>) -> Self {
        match failure {
            Failure::Timeout(stage) => {
                tracing::warn!(?stage, "recipe store timed out");
                RecipeError::Timeout(stage)
            }
            Failure::Store(err) => {
                tracing::error!(err = %err, "recipe store failed");
                RecipeError::Unexpected(Box::new(err))
            }
        }
    }
}
