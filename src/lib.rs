//! # Overview
//!
//! The HTTP layer of the recipe backend: a [`tower`](https://docs.rs/tower/latest/tower/)
//! middleware that authenticates requests against opaque-token sessions,
//! and an [`axum`] router serving recipes through a cache-aside layer.
//!
//! The moving parts live in [`recipe_backend_core`]:
//!
//! - a [`SessionStore`] keeping session payloads in a remote cache under
//!   random tokens;
//! - [`CachedRecipes`], which reads recipes through the cache and drops the
//!   cached copy after every write;
//! - [`RecipeService`], which writes recipes with optimistic concurrency: an
//!   update names the `updated_at` it was based on and is refused with a
//!   conflict if the recipe changed since;
//! - [`UserService`], which registers accounts and checks passwords, hashed
//!   here with Argon2id by [`Argon2Hasher`].
//!
//! Caches and stores are pluggable. This crate re-exports the Redis cache,
//! the PostgreSQL store and in-memory versions of both behind features.
//!
//! # Usage with an `axum` application
//!
//! ```rust,no_run
//! use recipe_backend::{
//!     recipe_backend_core::{CachedRecipes, RecipeService, SessionStore, UserService},
//!     router, AppState, Argon2Hasher, CookieConfig, MemoryCache, MemoryRecipeStore,
//!     MemoryUserStore,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let cache = MemoryCache::default();
//!     let recipes = CachedRecipes::new(cache.clone(), RecipeService::new(MemoryRecipeStore::new()));
//!     let users = UserService::new(MemoryUserStore::new(), Argon2Hasher::new());
//!     let sessions = SessionStore::new(cache);
//!
//!     let app = router(AppState::new(recipes, users, sessions, CookieConfig::default()));
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```
//!
//! # Sessions
//!
//! A session is created by [`sign_in`] once a handler has verified the
//! visitor's credentials; `POST /api/v1/auth/signin` does this after
//! checking the password with [`UserService::sign_in`]. The session token is sent to the browser in the
//! `SESSION_ID` cookie and is the only thing the visitor holds; the payload
//! stays in the cache and expires there after 14 days.
//!
//! On every request the [`AuthManagerLayer`] looks the token up and inserts a
//! [`CurrentSession`] into the request extensions, which handlers extract
//! directly:
//!
//! ```rust
//! use recipe_backend::{CurrentSession, SessionData};
//!
//! async fn whoami(session: CurrentSession<SessionData>) -> String {
//!     match session.payload() {
//!         Some(data) => data.email.clone(),
//!         None => "anonymous".to_string(),
//!     }
//! }
//! ```
//!
//! A cookie naming an unknown or expired session is removed and the request
//! continues anonymously. A session payload that cannot be decoded, or a
//! cache that cannot be reached, fails the request instead: the middleware
//! never silently signs a visitor out because of an outage.
//!
//! ## Cookie
//!
//! The cookie is `HttpOnly` and `SameSite=Lax`, scoped to `/`, and marked
//! `Secure` outside development. See [`CookieConfig`].
#![warn(
    clippy::all,
    nonstandard_style,
    future_incompatible,
    missing_debug_implementations
)]
#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub use recipe_backend_core;
#[doc(inline)]
pub use recipe_backend_core::{CachedRecipes, RecipeService, SessionStore, Token, UserService};
#[cfg(feature = "memory-store")]
#[cfg_attr(docsrs, doc(cfg(feature = "memory-store")))]
#[doc(inline)]
pub use recipe_backend_memory_store::{MemoryCache, MemoryRecipeStore, MemoryUserStore};
#[cfg(feature = "redis-store")]
#[cfg_attr(docsrs, doc(cfg(feature = "redis-store")))]
#[doc(inline)]
pub use recipe_backend_redis_store::RedisCache;
#[cfg(feature = "postgres-store")]
#[cfg_attr(docsrs, doc(cfg(feature = "postgres-store")))]
#[doc(inline)]
pub use recipe_backend_sqlx_store::{PostgresRecipeStore, PostgresUserStore};
#[cfg(feature = "postgres-store")]
#[cfg_attr(docsrs, doc(cfg(feature = "postgres-store")))]
pub use recipe_backend_sqlx_store;
pub use tower_cookies::cookie;

pub use crate::{
    cookie_config::CookieConfig,
    error::ApiError,
    password::Argon2Hasher,
    routes::{router, sign_in, AppState, SessionData},
    service::{AuthManager, AuthManagerLayer},
    session::CurrentSession,
};

pub mod config;
pub mod cookie_config;
pub mod error;
mod extract;
pub mod observability;
pub mod password;
pub mod routes;
pub mod service;
pub mod session;
