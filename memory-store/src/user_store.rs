use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use recipe_backend_core::{User, UserQueries, UserStore};
use tokio::sync::Mutex;

use crate::recipe_store::{simulate, MemoryStoreError};

type Accounts = HashMap<String, User>;

/// A users table that lives only in memory, keyed by email.
#[derive(Clone, Debug, Default)]
pub struct MemoryUserStore {
    accounts: Arc<Mutex<Accounts>>,
    latency: Duration,
}

impl MemoryUserStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every statement by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// The number of registered accounts.
    pub async fn len(&self) -> usize {
        self.accounts.lock().await.len()
    }

    /// Returns `true` if nobody has signed up.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// A connection checked out of a [`MemoryUserStore`].
#[derive(Debug)]
pub struct MemoryUserConnection {
    accounts: Arc<Mutex<Accounts>>,
    latency: Duration,
}

#[async_trait]
impl UserQueries for MemoryUserConnection {
    type Error = MemoryStoreError;

    async fn insert_user(&mut self, user: &User) -> Result<(), MemoryStoreError> {
        simulate(self.latency).await;
        let mut accounts = self.accounts.lock().await;
        if accounts.contains_key(&user.email) {
            return Err(MemoryStoreError::DuplicateEmail);
        }
        accounts.insert(user.email.clone(), user.clone());
        Ok(())
    }

    async fn fetch_user_by_email(
        &mut self,
        email: &str,
    ) -> Result<Option<User>, MemoryStoreError> {
        simulate(self.latency).await;
        Ok(self.accounts.lock().await.get(email).cloned())
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    type Error = MemoryStoreError;
    type Connection = MemoryUserConnection;

    async fn acquire(&self) -> Result<MemoryUserConnection, MemoryStoreError> {
        Ok(MemoryUserConnection {
            accounts: self.accounts.clone(),
            latency: self.latency,
        })
    }
}

#[cfg(test)]
mod tests {
    use recipe_backend_core::{StoreError, UserId};

    use super::*;

    fn user(email: &str) -> User {
        User {
            id: UserId::generate(),
            email: email.to_string(),
            password_hash: "hash".to_string(),
        }
    }

    #[tokio::test]
    async fn emails_are_unique() {
        let store = MemoryUserStore::new();
        let mut conn = store.acquire().await.unwrap();
        conn.insert_user(&user("user@mail.com")).await.unwrap();

        let err = conn.insert_user(&user("user@mail.com")).await.unwrap_err();
        assert!(err.is_unique_violation());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn fetch_by_email() {
        let store = MemoryUserStore::new();
        let alice = user("alice@mail.com");
        let mut conn = store.acquire().await.unwrap();
        conn.insert_user(&alice).await.unwrap();

        assert_eq!(
            conn.fetch_user_by_email("alice@mail.com").await.unwrap(),
            Some(alice)
        );
        assert_eq!(conn.fetch_user_by_email("bob@mail.com").await.unwrap(), None);
    }
}
