#![allow(dead_code)]

use std::{
    io,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use axum::{body::Body, Router};
use http::{header, HeaderMap, Request};
use http_body_util::BodyExt;
use recipe_backend::{
    cookie::Cookie,
    recipe_backend_core::{
        CacheClient, CacheItem, CachedRecipes, RecipeService, SessionStore, Token, UserService,
    },
    router, AppState, Argon2Hasher, CookieConfig, MemoryCache, MemoryRecipeStore,
    MemoryUserStore, SessionData,
};

/// A [`MemoryCache`] that counts calls and can be told to fail reads or
/// deletes.
#[derive(Clone, Debug, Default)]
pub struct CountingCache {
    inner: MemoryCache,
    calls: Arc<AtomicUsize>,
    fail_gets: Arc<AtomicBool>,
    fail_deletes: Arc<AtomicBool>,
}

impl CountingCache {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn fail_gets(&self, fail: bool) {
        self.fail_gets.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    fn count(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

fn gone() -> io::Error {
    io::Error::new(io::ErrorKind::ConnectionReset, "cache went away")
}

fn to_io(err: impl std::error::Error + Send + Sync + 'static) -> io::Error {
    io::Error::new(io::ErrorKind::Other, err)
}

#[async_trait]
impl CacheClient for CountingCache {
    type Error = io::Error;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, io::Error> {
        self.count();
        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(gone());
        }
        self.inner.get(key).await.map_err(to_io)
    }

    async fn set(&self, item: &CacheItem) -> Result<(), io::Error> {
        self.count();
        self.inner.set(item).await.map_err(to_io)
    }

    async fn add(&self, item: &CacheItem) -> Result<bool, io::Error> {
        self.count();
        self.inner.add(item).await.map_err(to_io)
    }

    async fn replace(&self, item: &CacheItem) -> Result<bool, io::Error> {
        self.count();
        self.inner.replace(item).await.map_err(to_io)
    }

    async fn delete(&self, key: &str) -> Result<bool, io::Error> {
        self.count();
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(gone());
        }
        self.inner.delete(key).await.map_err(to_io)
    }
}

pub struct TestApp {
    pub app: Router,
    pub cache: CountingCache,
    pub store: MemoryRecipeStore,
    pub users: MemoryUserStore,
    pub sessions: SessionStore<CountingCache>,
}

/// Argon2id with the smallest parameters it accepts.
pub fn cheap_hasher() -> Argon2Hasher {
    Argon2Hasher::new().with_params(argon2::Params::new(8, 1, 1, None).unwrap())
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_store(MemoryRecipeStore::new())
    }

    pub fn with_store(store: MemoryRecipeStore) -> Self {
        let cache = CountingCache::default();
        let sessions = SessionStore::new(cache.clone());
        let recipes = CachedRecipes::new(cache.clone(), RecipeService::new(store.clone()));
        let users = MemoryUserStore::new();
        let app = router(AppState::new(
            recipes,
            UserService::new(users.clone(), cheap_hasher()),
            sessions.clone(),
            CookieConfig::default(),
        ));

        Self {
            app,
            cache,
            store,
            users,
            sessions,
        }
    }

    pub async fn sign_in(&self, email: &str) -> Token {
        self.sessions
            .create(&SessionData {
                email: email.to_string(),
            })
            .await
            .unwrap()
    }
}

pub fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub fn with_session_cookie(mut req: Request<Body>, value: &str) -> Request<Body> {
    let cookie = Cookie::new("SESSION_ID", value.to_string());
    req.headers_mut().insert(
        header::COOKIE,
        cookie.encoded().to_string().parse().unwrap(),
    );
    req
}

pub async fn body_json(body: Body) -> serde_json::Value {
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn get_session_cookie(headers: &HeaderMap) -> Option<Cookie<'static>> {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .flat_map(|header| header.to_str())
        .flat_map(|value| Cookie::parse_encoded(value.to_string()))
        .find(|cookie| cookie.name() == "SESSION_ID")
}
