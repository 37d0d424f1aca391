pub use sqlx;

#[cfg(feature = "postgres")]
#[cfg_attr(docsrs, doc(cfg(feature = "postgres")))]
pub use self::postgres_store::{
    connect_pool, PoolSettings, PostgresConnection, PostgresRecipeStore, PostgresTransaction,
};
#[cfg(feature = "postgres")]
#[cfg_attr(docsrs, doc(cfg(feature = "postgres")))]
pub use self::postgres_user_store::{PostgresUserConnection, PostgresUserStore};

#[cfg(feature = "postgres")]
#[cfg_attr(docsrs, doc(cfg(feature = "postgres")))]
mod postgres_store;
#[cfg(feature = "postgres")]
#[cfg_attr(docsrs, doc(cfg(feature = "postgres")))]
mod postgres_user_store;

/// SQLSTATE raised by Postgres when a unique constraint is violated.
pub const PG_UNIQUE_VIOLATION: &str = "23505";

/// An error type for SQLx stores.
#[derive(thiserror::Error, Debug)]
pub enum SqlxStoreError {
    /// A variant to map `sqlx` errors.
    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

impl SqlxStoreError {
    /// Returns `true` if the database reported the SQLSTATE `code`.
    pub fn has_code(&self, code: &str) -> bool {
        match self {
            Self::Sqlx(sqlx::Error::Database(db_err)) => db_err.code().as_deref() == Some(code),
            Self::Sqlx(_) => false,
        }
    }
}

impl recipe_backend_core::StoreError for SqlxStoreError {
    fn is_unique_violation(&self) -> bool {
        self.has_code(PG_UNIQUE_VIOLATION)
    }
}
