use std::time::Duration;

use async_trait::async_trait;
use recipe_backend_core::{
    Recipe, RecipeId, RecipeQueries, RecipeStore, RecipeTransaction, RecipeUpdate,
};
use sqlx::{
    pool::PoolConnection,
    postgres::{PgPoolOptions, Postgres},
    PgConnection, PgPool, Transaction,
};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::SqlxStoreError;

/// Sizing of the connection pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    /// Upper bound on open connections.
    pub max_connections: u32,

    /// Connections kept open while idle.
    pub min_connections: u32,

    /// How long a connection may stay idle before it is closed.
    pub idle_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 25,
            min_connections: 3,
            idle_timeout: Duration::from_secs(15 * 60),
        }
    }
}

/// Open a connection pool to the database at `url`.
///
/// Connections are not tested before they are handed out; acquisition
/// deadlines are enforced by the caller.
pub async fn connect_pool(url: &str, settings: PoolSettings) -> sqlx::Result<PgPool> {
    tracing::info!(
        max_connections = settings.max_connections,
        min_connections = settings.min_connections,
        "creating postgres connection pool"
    );

    PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .idle_timeout(settings.idle_timeout)
        .test_before_acquire(false)
        .connect(url)
        .await
}

/// A PostgreSQL recipe store.
#[derive(Clone, Debug)]
pub struct PostgresRecipeStore {
    pool: PgPool,
}

impl PostgresRecipeStore {
    /// Create a new PostgreSQL store with the provided connection pool.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use recipe_backend_sqlx_store::{sqlx::PgPool, PostgresRecipeStore};
    ///
    /// # async fn run() -> sqlx::Result<()> {
    /// let database_url = std::option_env!("DATABASE_URL").unwrap();
    /// let pool = PgPool::connect(database_url).await?;
    /// let store = PostgresRecipeStore::new(pool);
    /// store.migrate().await?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the `recipes` table if it does not exist.
    pub async fn migrate(&self) -> sqlx::Result<()> {
        let mut tx = self.pool.begin().await?;

        // Concurrent `create table if not exists` may race on the catalog.
        if let Err(err) = sqlx::query(
            r#"
            create table if not exists recipes
            (
                recipe_id uuid primary key,
                title text not null,
                content text not null,
                created_at timestamptz not null,
                updated_at timestamptz not null
            )
            "#,
        )
        .execute(&mut *tx)
        .await
        {
            if !err
                .to_string()
                .contains("duplicate key value violates unique constraint")
            {
                return Err(err);
            }

            return Ok(());
        }

        tx.commit().await?;

        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct RecipeRow {
    recipe_id: Uuid,
    title: String,
    content: String,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<RecipeRow> for Recipe {
    fn from(row: RecipeRow) -> Self {
        Self {
            id: RecipeId::from_uuid(row.recipe_id),
            title: row.title,
            content: row.content,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

async fn insert(conn: &mut PgConnection, recipe: &Recipe) -> Result<(), SqlxStoreError> {
    sqlx::query(
        r#"
        insert into recipes (recipe_id, title, content, created_at, updated_at)
        values ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(*recipe.id.as_uuid())
    .bind(&recipe.title)
    .bind(&recipe.content)
    .bind(recipe.created_at)
    .bind(recipe.updated_at)
    .execute(conn)
    .await?;

    Ok(())
}

async fn fetch(conn: &mut PgConnection, id: &RecipeId) -> Result<Option<Recipe>, SqlxStoreError> {
    let row: Option<RecipeRow> = sqlx::query_as(
        r#"
        select recipe_id, title, content, created_at, updated_at
        from recipes
        where recipe_id = $1
        "#,
    )
    .bind(*id.as_uuid())
    .fetch_optional(conn)
    .await?;

    Ok(row.map(Recipe::from))
}

async fn update(
    conn: &mut PgConnection,
    id: &RecipeId,
    expected: OffsetDateTime,
    fields: &RecipeUpdate,
    updated_at: OffsetDateTime,
) -> Result<u64, SqlxStoreError> {
    let result = sqlx::query(
        r#"
        update recipes
        set title = $1, content = $2, updated_at = $3
        where recipe_id = $4 and updated_at = $5
        "#,
    )
    .bind(&fields.title)
    .bind(&fields.content)
    .bind(updated_at)
    .bind(*id.as_uuid())
    .bind(expected)
    .execute(conn)
    .await?;

    Ok(result.rows_affected())
}

async fn exists(conn: &mut PgConnection, id: &RecipeId) -> Result<bool, SqlxStoreError> {
    let (exists,): (bool,) =
        sqlx::query_as("select exists(select 1 from recipes where recipe_id = $1)")
            .bind(*id.as_uuid())
            .fetch_one(conn)
            .await?;

    Ok(exists)
}

async fn delete(conn: &mut PgConnection, id: &RecipeId) -> Result<u64, SqlxStoreError> {
    let result = sqlx::query("delete from recipes where recipe_id = $1")
        .bind(*id.as_uuid())
        .execute(conn)
        .await?;

    Ok(result.rows_affected())
}

/// A connection checked out of the pool.
#[derive(Debug)]
pub struct PostgresConnection(PoolConnection<Postgres>);

/// A transaction on a pooled connection.
///
/// Dropping it without committing rolls it back.
#[derive(Debug)]
pub struct PostgresTransaction(Transaction<'static, Postgres>);

#[async_trait]
impl RecipeQueries for PostgresConnection {
    type Error = SqlxStoreError;

    async fn insert_recipe(&mut self, recipe: &Recipe) -> Result<(), Self::Error> {
        insert(&mut self.0, recipe).await
    }

    async fn fetch_recipe(&mut self, id: &RecipeId) -> Result<Option<Recipe>, Self::Error> {
        fetch(&mut self.0, id).await
    }

    async fn update_recipe(
        &mut self,
        id: &RecipeId,
        expected: OffsetDateTime,
        fields: &RecipeUpdate,
        updated_at: OffsetDateTime,
    ) -> Result<u64, Self::Error> {
        update(&mut self.0, id, expected, fields, updated_at).await
    }

    async fn recipe_exists(&mut self, id: &RecipeId) -> Result<bool, Self::Error> {
        exists(&mut self.0, id).await
    }

    async fn delete_recipe(&mut self, id: &RecipeId) -> Result<u64, Self::Error> {
        delete(&mut self.0, id).await
    }
}

#[async_trait]
impl RecipeQueries for PostgresTransaction {
    type Error = SqlxStoreError;

    async fn insert_recipe(&mut self, recipe: &Recipe) -> Result<(), Self::Error> {
        insert(&mut self.0, recipe).await
    }

    async fn fetch_recipe(&mut self, id: &RecipeId) -> Result<Option<Recipe>, Self::Error> {
        fetch(&mut self.0, id).await
    }

    async fn update_recipe(
        &mut self,
        id: &RecipeId,
        expected: OffsetDateTime,
        fields: &RecipeUpdate,
        updated_at: OffsetDateTime,
    ) -> Result<u64, Self::Error> {
        update(&mut self.0, id, expected, fields, updated_at).await
    }

    async fn recipe_exists(&mut self, id: &RecipeId) -> Result<bool, Self::Error> {
        exists(&mut self.0, id).await
    }

    async fn delete_recipe(&mut self, id: &RecipeId) -> Result<u64, Self::Error> {
        delete(&mut self.0, id).await
    }
}

#[async_trait]
impl RecipeTransaction for PostgresTransaction {
    async fn commit(self) -> Result<(), Self::Error> {
        Ok(self.0.commit().await?)
    }

    async fn rollback(self) -> Result<(), Self::Error> {
        Ok(self.0.rollback().await?)
    }
}

#[async_trait]
impl RecipeStore for PostgresRecipeStore {
    type Error = SqlxStoreError;
    type Connection = PostgresConnection;
    type Transaction = PostgresTransaction;

    async fn acquire(&self) -> Result<PostgresConnection, SqlxStoreError> {
        Ok(PostgresConnection(self.pool.acquire().await?))
    }

    async fn begin(&self) -> Result<PostgresTransaction, SqlxStoreError> {
        Ok(PostgresTransaction(self.pool.begin().await?))
    }
}
