//! Sessions, cache-aside reads and optimistic updates for the recipe backend.
//!
//! This crate holds everything that does not depend on a particular cache,
//! database or HTTP framework:
//!
//! - [`CacheClient`], the remote key-value cache, and [`SessionStore`], which
//!   keeps opaque-token sessions in it.
//! - [`RecipeStore`], the relational store, and [`RecipeService`], which
//!   runs recipe operations on it under a timeout [`Budget`] with optimistic
//!   concurrency.
//! - [`CachedRecipes`], a cache-aside layer in front of the service.
//! - [`UserStore`] and [`UserService`], which register accounts and check
//!   credentials with a pluggable [`PasswordHasher`].
//!
//! Implementations of the cache and the store live in their own crates.
#[doc(inline)]
pub use self::{
    accounts::{UserError, UserService},
    cache::{CacheClient, CacheItem},
    cached::CachedRecipes,
    item_pool::{ItemPool, PooledItem},
    password::{PasswordError, PasswordHasher},
    recipe::{NewRecipe, Recipe, RecipeId, RecipeUpdate},
    recipe_store::{RecipeQueries, RecipeStore, RecipeTransaction, StoreError},
    service::{Budget, RecipeError, RecipeService, TimeoutStage},
    session_store::{CreationFailure, SessionError, SessionStore},
    token::Token,
    user::{User, UserId},
    user_store::{UserQueries, UserStore},
};

/// Signing up and signing in.
pub mod accounts;
/// The remote cache client.
pub mod cache;
/// Cache-aside reads of recipes.
pub mod cached;
/// Reusable cache items.
pub mod item_pool;
/// Password hashing.
pub mod password;
/// Recipe types.
pub mod recipe;
/// The relational store.
pub mod recipe_store;
/// Recipe operations.
pub mod service;
/// Sessions stored in the cache.
pub mod session_store;
/// Session tokens.
pub mod token;
/// User accounts.
pub mod user;
/// The relational store holding users.
pub mod user_store;

#[cfg(test)]
mod testing;
