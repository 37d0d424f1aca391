//! The relational store holding user accounts.
//!
//! Follows the same rules as [`recipe_store`](crate::recipe_store): misses are
//! `Ok(None)`, and a duplicate email is reported through
//! [`StoreError::is_unique_violation`].
use async_trait::async_trait;

use crate::{recipe_store::StoreError, user::User};

/// Statements on the users table.
#[async_trait]
pub trait UserQueries: Send {
    /// The error raised by the store.
    type Error: StoreError;

    /// Insert a new account.
    ///
    /// Fails with a unique violation if the email is already registered.
    async fn insert_user(&mut self, user: &User) -> Result<(), Self::Error>;

    /// Fetch an account by its email.
    async fn fetch_user_by_email(&mut self, email: &str) -> Result<Option<User>, Self::Error>;
}

/// A pool of connections to the users table.
#[async_trait]
pub trait UserStore: Clone + Send + Sync + 'static {
    /// The error raised by the store.
    type Error: StoreError;

    /// A checked-out connection; it returns to the pool when dropped.
    type Connection: UserQueries<Error = Self::Error>;

    /// Check out a connection.
    async fn acquire(&self) -> Result<Self::Connection, Self::Error>;
}
