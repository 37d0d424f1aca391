use async_trait::async_trait;
use recipe_backend_core::{User, UserId, UserQueries, UserStore};
use sqlx::{pool::PoolConnection, postgres::Postgres, PgPool};
use uuid::Uuid;

use crate::SqlxStoreError;

/// A PostgreSQL users store.
#[derive(Clone, Debug)]
pub struct PostgresUserStore {
    pool: PgPool,
}

impl PostgresUserStore {
    /// Create a new store with the provided connection pool.
    ///
    /// The pool is usually shared with a
    /// [`PostgresRecipeStore`](crate::PostgresRecipeStore).
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the `users` table if it does not exist.
    pub async fn migrate(&self) -> sqlx::Result<()> {
        let mut tx = self.pool.begin().await?;

        if let Err(err) = sqlx::query(
            r#"
            create table if not exists users
            (
                user_id uuid primary key,
                email text not null unique,
                password text not null
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
struct UserRow {
    user_id: Uuid,
    email: String,
    password: String,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: UserId::from(row.user_id),
            email: row.email,
            password_hash: row.password,
        }
    }
}

/// A connection checked out of the pool for user statements.
#[derive(Debug)]
pub struct PostgresUserConnection(PoolConnection<Postgres>);

#[async_trait]
impl UserQueries for PostgresUserConnection {
    type Error = SqlxStoreError;

    async fn insert_user(&mut self, user: &User) -> Result<(), SqlxStoreError> {
        sqlx::query("insert into users (user_id, email, password) values ($1, $2, $3)")
            .bind(*user.id.as_uuid())
            .bind(&user.email)
            .bind(&user.password_hash)
            .execute(&mut *self.0)
            .await?;

        Ok(())
    }

    async fn fetch_user_by_email(&mut self, email: &str) -> Result<Option<User>, SqlxStoreError> {
        let row: Option<UserRow> =
            sqlx::query_as("select user_id, email, password from users where email = $1")
                .bind(email)
                .fetch_optional(&mut *self.0)
                .await?;

        Ok(row.map(User::from))
    }
}

#[async_trait]
impl UserStore for PostgresUserStore {
    type Error = SqlxStoreError;
    type Connection = PostgresUserConnection;

    async fn acquire(&self) -> Result<PostgresUserConnection, SqlxStoreError> {
        Ok(PostgresUserConnection(self.pool.acquire().await?))
    }
}
