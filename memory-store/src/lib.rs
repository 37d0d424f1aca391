//! In-memory implementations of the recipe backend's cache and stores.
//!
//! Both live only as long as the process and are meant for tests and local
//! development, not for real deployments.
pub use self::{
    cache::{MemoryCache, MemoryCacheError},
    recipe_store::{MemoryConnection, MemoryRecipeStore, MemoryStoreError, MemoryTransaction},
    user_store::{MemoryUserConnection, MemoryUserStore},
};

mod cache;
mod recipe_store;
mod user_store;
