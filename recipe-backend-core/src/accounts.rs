//! Signing up and signing in.
//!
//! [`UserService`] registers accounts and checks credentials. It knows
//! nothing about sessions: once [`UserService::sign_in`] has returned a
//! [`User`], the caller issues a session for it.
use std::{fmt, future::Future, sync::Arc};

use crate::{
    password::PasswordHasher,
    recipe_store::StoreError,
    service::{bounded, Budget, Failure, TimeoutStage},
    user::{User, UserId},
    user_store::{UserQueries, UserStore},
};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// An error type for [`UserService`].
#[derive(thiserror::Error, Debug)]
pub enum UserError {
    /// Another account already uses this email.
    #[error("user with this email already exists")]
    EmailTaken,

    /// The email is unknown or the password does not match.
    #[error("invalid email or password")]
    InvalidCredentials,

    /// The store did not answer within the budget.
    #[error("store timed out during {0:?}")]
    Timeout(TimeoutStage),

    /// Any other failure, including a failing password hasher.
    #[error("unexpected error: {0}")]
    Unexpected(#[source] BoxError),
}

impl<E: StoreError> From<Failure<E>> for UserError {
    fn from(failure: Failure<E>) -> Self {
        match failure {
            Failure::Timeout(stage) => {
                tracing::warn!(?stage, "user store timed out");
                UserError::Timeout(stage)
            }
            Failure::Store(err) => {
                tracing::error!(err = %err, "user store failed");
                UserError::Unexpected(Box::new(err))
            }
        }
    }
}

/// Registers accounts and verifies credentials.
pub struct UserService<U> {
    store: U,
    hasher: Arc<dyn PasswordHasher>,
    budget: Budget,
}

impl<U: Clone> Clone for UserService<U> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            hasher: self.hasher.clone(),
            budget: self.budget,
        }
    }
}

impl<U: fmt::Debug> fmt::Debug for UserService<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserService")
            .field("store", &self.store)
            .field("budget", &self.budget)
            .finish_non_exhaustive()
    }
}

impl<U: UserStore> UserService<U> {
    /// Create a service over `store`, hashing passwords with `hasher`.
    pub fn new<H: PasswordHasher>(store: U, hasher: H) -> Self {
        Self {
            store,
            hasher: Arc::new(hasher),
            budget: Budget::default(),
        }
    }

    /// Set the timeout budget.
    pub fn with_budget(mut self, budget: Budget) -> Self {
        self.budget = budget;
        self
    }

    /// Register a new account.
    ///
    /// # Errors
    ///
    /// Fails with [`UserError::EmailTaken`] if the email is already
    /// registered.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<UserId, UserError> {
        let password_hash = self.hash(password).await?;
        let user = User {
            id: UserId::generate(),
            email: email.to_owned(),
            password_hash,
        };

        let mut conn = self.acquire().await?;
        match self.execute(conn.insert_user(&user)).await {
            Ok(()) => {
                tracing::debug!(user.id = %user.id, "created user");
                Ok(user.id)
            }
            Err(Failure::Store(err)) if err.is_unique_violation() => {
                tracing::debug!("email already registered");
                Err(UserError::EmailTaken)
            }
            Err(failure) => Err(failure.into()),
        }
    }

    /// Check a user's credentials and return the account.
    ///
    /// An unknown email and a wrong password are both reported as
    /// [`UserError::InvalidCredentials`].
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<User, UserError> {
        let mut conn = self.acquire().await?;
        let user = self.execute(conn.fetch_user_by_email(email)).await?;
        drop(conn);

        let Some(user) = user else {
            tracing::debug!("sign in with unknown email");
            return Err(UserError::InvalidCredentials);
        };

        if self.verify(password, &user.password_hash).await? {
            tracing::debug!(user.id = %user.id, "signed in");
            Ok(user)
        } else {
            tracing::debug!(user.id = %user.id, "sign in with wrong password");
            Err(UserError::InvalidCredentials)
        }
    }

    async fn hash(&self, password: &str) -> Result<String, UserError> {
        let hasher = self.hasher.clone();
        let password = password.to_owned();
        blocking(move || hasher.hash(&password)).await
    }

    async fn verify(&self, password: &str, hash: &str) -> Result<bool, UserError> {
        let hasher = self.hasher.clone();
        let password = password.to_owned();
        let hash = hash.to_owned();
        blocking(move || hasher.verify(&password, &hash)).await
    }

    async fn acquire(&self) -> Result<U::Connection, UserError> {
        Ok(bounded(self.budget.acquire, TimeoutStage::Acquire, self.store.acquire()).await?)
    }

    async fn execute<T, F>(&self, fut: F) -> Result<T, Failure<U::Error>>
    where
        F: Future<Output = Result<T, U::Error>>,
    {
        bounded(self.budget.execute, TimeoutStage::Execute, fut).await
    }
}

async fn blocking<T, F>(f: F) -> Result<T, UserError>
where
    F: FnOnce() -> Result<T, crate::password::PasswordError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|err| UserError::Unexpected(Box::new(err)))?
        .map_err(|err| {
            tracing::error!(err = %err, "password hasher failed");
            UserError::Unexpected(Box::new(err))
        })
}
