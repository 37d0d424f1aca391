mod common;

use std::time::Duration;

use axum::{extract::State, routing::get, routing::post, Router};
use http::{header, StatusCode};
use recipe_backend::{
    cookie::SameSite,
    recipe_backend_core::{CacheClient, CacheItem, SessionStore},
    sign_in, CookieConfig, CurrentSession, MemoryCache, SessionData,
};
use tower::ServiceExt;
use tower_cookies::{CookieManagerLayer, Cookies};

use crate::common::{
    body_json, empty_request, get_session_cookie, with_session_cookie, TestApp,
};

#[tokio::test]
async fn no_cookie_is_anonymous() {
    let app = TestApp::new();
    let res = app
        .app
        .clone()
        .oneshot(empty_request("GET", "/api/v1/auth/session"))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert!(get_session_cookie(res.headers()).is_none());
    assert_eq!(app.cache.calls(), 0);
}

#[tokio::test]
async fn live_session_is_authenticated() {
    let app = TestApp::new();
    let token = app.sign_in("user@mail.com").await;

    let req = with_session_cookie(
        empty_request("GET", "/api/v1/auth/session"),
        &token.to_string(),
    );
    let res = app.app.clone().oneshot(req).await.unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert!(get_session_cookie(res.headers()).is_none());
    let body = body_json(res.into_body()).await;
    assert_eq!(body["data"]["email"], "user@mail.com");
}

#[tokio::test]
async fn unknown_session_removes_the_cookie() {
    let app = TestApp::new();
    let token = app.sign_in("user@mail.com").await;
    app.sessions.delete(&token).await.unwrap();

    let req = with_session_cookie(
        empty_request("GET", "/api/v1/auth/session"),
        &token.to_string(),
    );
    let res = app.app.clone().oneshot(req).await.unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let cookie = get_session_cookie(res.headers()).unwrap();
    assert_eq!(cookie.value(), "");
    assert_eq!(cookie.path(), Some("/"));
    assert_eq!(cookie.max_age(), Some(time::Duration::ZERO));
}

#[tokio::test]
async fn malformed_cookie_is_treated_as_unknown() {
    let app = TestApp::new();
    let req = with_session_cookie(empty_request("GET", "/api/v1/auth/session"), "malformed");
    let res = app.app.clone().oneshot(req).await.unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(get_session_cookie(res.headers()).unwrap().value(), "");
    // Never looked up.
    assert_eq!(app.cache.calls(), 0);
}

#[tokio::test]
async fn corrupt_payload_aborts_the_request() {
    let app = TestApp::new();
    let token = app.sign_in("user@mail.com").await;
    app.cache
        .set(&CacheItem::new(
            token.to_string(),
            b"\x81\xa5email".to_vec(),
            Duration::from_secs(60),
        ))
        .await
        .unwrap();

    let req = with_session_cookie(
        empty_request("GET", "/api/v1/auth/session"),
        &token.to_string(),
    );
    let res = app.app.clone().oneshot(req).await.unwrap();

    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(get_session_cookie(res.headers()).is_none());
}

#[tokio::test]
async fn unreachable_cache_aborts_the_request() {
    let app = TestApp::new();
    let token = app.sign_in("user@mail.com").await;
    app.cache.fail_gets(true);

    // Sign-out would delete the session and clear the cookie if it ran.
    let req = with_session_cookie(
        empty_request("POST", "/api/v1/auth/signout"),
        &token.to_string(),
    );
    let res = app.app.clone().oneshot(req).await.unwrap();

    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(get_session_cookie(res.headers()).is_none());

    app.cache.fail_gets(false);
    let payload: SessionData = app.sessions.get(&token).await.unwrap();
    assert_eq!(payload.email, "user@mail.com");
}

#[tokio::test]
async fn health_bypasses_the_cache() {
    let app = TestApp::new();
    let token = app.sign_in("user@mail.com").await;
    let calls = app.cache.calls();

    let req = with_session_cookie(empty_request("GET", "/api/v1/health"), &token.to_string());
    let res = app.app.clone().oneshot(req).await.unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(app.cache.calls(), calls);
    assert!(get_session_cookie(res.headers()).is_none());
}

#[tokio::test]
async fn sign_out_deletes_the_session() {
    let app = TestApp::new();
    let token = app.sign_in("user@mail.com").await;

    let req = with_session_cookie(
        empty_request("POST", "/api/v1/auth/signout"),
        &token.to_string(),
    );
    let res = app.app.clone().oneshot(req).await.unwrap();

    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert_eq!(get_session_cookie(res.headers()).unwrap().value(), "");
    assert!(app.sessions.get::<SessionData>(&token).await.is_err());
}

#[tokio::test]
async fn failed_sign_out_still_clears_the_cookie() {
    let app = TestApp::new();
    let token = app.sign_in("user@mail.com").await;
    app.cache.fail_deletes(true);

    let req = with_session_cookie(
        empty_request("POST", "/api/v1/auth/signout"),
        &token.to_string(),
    );
    let res = app.app.clone().oneshot(req).await.unwrap();

    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let cookie = get_session_cookie(res.headers()).unwrap();
    assert_eq!(cookie.value(), "");
    assert_eq!(cookie.max_age(), Some(time::Duration::ZERO));

    // The session itself outlives the failure.
    assert!(app.sessions.get::<SessionData>(&token).await.is_ok());
}

#[tokio::test]
async fn sign_in_sets_the_session_cookie() {
    let sessions = SessionStore::new(MemoryCache::default());
    let cookie_config = CookieConfig::default().with_secure(false);

    let app = Router::new()
        .route(
            "/signin",
            post(
                |State((sessions, cookie_config)): State<(
                    SessionStore<MemoryCache>,
                    CookieConfig,
                )>,
                 cookies: Cookies| async move {
                    let payload = SessionData {
                        email: "user@mail.com".to_string(),
                    };
                    sign_in(&sessions, &cookies, &cookie_config, &payload)
                        .await
                        .unwrap();
                },
            ),
        )
        .layer(CookieManagerLayer::new())
        .with_state((sessions.clone(), cookie_config));

    let res = app
        .oneshot(empty_request("POST", "/signin"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let cookie = get_session_cookie(res.headers()).unwrap();
    assert_eq!(cookie.http_only(), Some(true));
    assert_eq!(cookie.same_site(), Some(SameSite::Lax));
    assert_eq!(cookie.secure(), Some(false));
    assert_eq!(cookie.path(), Some("/"));
    assert_eq!(cookie.max_age(), Some(time::Duration::days(14)));

    let token = cookie.value().parse().unwrap();
    let payload: SessionData = sessions.get(&token).await.unwrap();
    assert_eq!(payload.email, "user@mail.com");
}

#[tokio::test]
async fn extractor_without_middleware_is_an_error() {
    let app = Router::new().route(
        "/",
        get(|_: CurrentSession<SessionData>| async move { "unreachable" }),
    );

    let res = app.oneshot(empty_request("GET", "/")).await.unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn set_cookie_is_only_sent_when_needed() {
    let app = TestApp::new();
    let token = app.sign_in("user@mail.com").await;

    let req = with_session_cookie(
        empty_request("GET", "/api/v1/auth/session"),
        &token.to_string(),
    );
    let res = app.app.clone().oneshot(req).await.unwrap();
    assert!(res.headers().get(header::SET_COOKIE).is_none());
}
