//! A middleware that provides [`CurrentSession`] as a request extension.
use std::{
    fmt,
    future::Future,
    marker::PhantomData,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use http::{Request, Response, StatusCode, Uri};
use recipe_backend_core::{CacheClient, SessionError, SessionStore, Token};
use serde::de::DeserializeOwned;
use tower_cookies::{CookieManager, Cookies};
use tower_layer::Layer;
use tower_service::Service;
use tracing::Instrument;

use crate::{CookieConfig, CurrentSession};

type BypassFn = dyn Fn(&Uri) -> bool + Send + Sync;

/// Decides which requests skip session handling altogether.
#[derive(Clone, Default)]
struct Bypass(Option<Arc<BypassFn>>);

impl Bypass {
    fn matches(&self, uri: &Uri) -> bool {
        self.0.as_ref().is_some_and(|bypass| bypass(uri))
    }
}

impl fmt::Debug for Bypass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Bypass")
            .field(&self.0.as_ref().map(|_| ".."))
            .finish()
    }
}

/// Returns `true` if `path` is `prefix` or lies below it.
fn is_under(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

fn error_response<ResBody: Default>(status: StatusCode) -> Response<ResBody> {
    let mut res = Response::default();
    *res.status_mut() = status;
    res
}

/// A middleware that provides [`CurrentSession`] as a request extension.
///
/// For each request that is not bypassed, the session cookie is looked up in
/// the [`SessionStore`]:
///
/// - no cookie: the request is anonymous;
/// - an unknown or expired token: the request is anonymous and the cookie is
///   removed;
/// - a live session: the request is authenticated with its payload.
///
/// A payload that cannot be decoded, or a failing cache, aborts the request
/// without calling the inner service.
pub struct AuthManager<S, C, P> {
    inner: S,
    sessions: SessionStore<C>,
    cookie_config: Arc<CookieConfig>,
    bypass: Bypass,
    _payload: PhantomData<fn() -> P>,
}

impl<S: Clone, C: Clone, P> Clone for AuthManager<S, C, P> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            sessions: self.sessions.clone(),
            cookie_config: self.cookie_config.clone(),
            bypass: self.bypass.clone(),
            _payload: PhantomData,
        }
    }
}

impl<S: fmt::Debug, C: fmt::Debug, P> fmt::Debug for AuthManager<S, C, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthManager")
            .field("inner", &self.inner)
            .field("sessions", &self.sessions)
            .field("cookie_config", &self.cookie_config)
            .field("bypass", &self.bypass)
            .finish()
    }
}

impl<ReqBody, ResBody, S, C, P> Service<Request<ReqBody>> for AuthManager<S, C, P>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    C: CacheClient,
    P: DeserializeOwned + Clone + Send + Sync + 'static,
    ReqBody: Send + 'static,
    ResBody: Default + Send,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    #[inline]
    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        let span = tracing::debug_span!("auth", path = %req.uri().path());

        let sessions = self.sessions.clone();
        let cookie_config = self.cookie_config.clone();
        let bypassed = self.bypass.matches(req.uri());

        // Because the inner service can panic until ready, we need to ensure we only
        // use the ready service.
        //
        // See: https://docs.rs/tower/latest/tower/trait.Service.html#be-careful-when-cloning-inner-services
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(
            async move {
                if bypassed {
                    tracing::trace!("bypassing session handling");
                    return inner.call(req).await;
                }

                let Some(cookies) = req.extensions().get::<Cookies>().cloned() else {
                    // In practice this should never happen because we wrap `CookieManager`
                    // directly.
                    tracing::error!("missing cookies request extension");
                    return Ok(error_response(StatusCode::INTERNAL_SERVER_ERROR));
                };

                let session = match load_session::<C, P>(&sessions, &cookies, &cookie_config).await
                {
                    Ok(session) => session,
                    Err(status) => return Ok(error_response(status)),
                };

                tracing::trace!(authenticated = session.is_authenticated(), "session state");
                req.extensions_mut().insert(session);

                inner.call(req).await
            }
            .instrument(span),
        )
    }
}

async fn load_session<C, P>(
    sessions: &SessionStore<C>,
    cookies: &Cookies,
    cookie_config: &CookieConfig,
) -> Result<CurrentSession<P>, StatusCode>
where
    C: CacheClient,
    P: DeserializeOwned,
{
    let Some(cookie) = cookies.get(&cookie_config.name) else {
        return Ok(CurrentSession::anonymous());
    };

    let token = match cookie.value().parse::<Token>() {
        Ok(token) => token,
        Err(err) => {
            tracing::warn!(
                err = %err,
                "possibly suspicious activity: malformed session token"
            );
            cookies.remove(cookie_config.removal_cookie());
            return Ok(CurrentSession::anonymous());
        }
    };

    match sessions.get::<P>(&token).await {
        Ok(payload) => Ok(CurrentSession::authenticated(token, payload)),

        Err(SessionError::NotFound) => {
            tracing::debug!("removing cookie of unknown session");
            cookies.remove(cookie_config.removal_cookie());
            Ok(CurrentSession::anonymous())
        }

        Err(err @ SessionError::Decode(_)) => {
            tracing::error!(err = %err, "stored session payload is corrupt");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }

        Err(err @ SessionError::Timeout(_)) => {
            tracing::error!(err = %err, "failed to load session");
            Err(StatusCode::REQUEST_TIMEOUT)
        }

        Err(err) => {
            tracing::error!(err = %err, "failed to load session");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// A layer for providing [`CurrentSession`] as a request extension.
///
/// `P` is the session payload type the middleware decodes.
pub struct AuthManagerLayer<C, P> {
    sessions: SessionStore<C>,
    cookie_config: Arc<CookieConfig>,
    bypass: Bypass,
    _payload: PhantomData<fn() -> P>,
}

impl<C: Clone, P> Clone for AuthManagerLayer<C, P> {
    fn clone(&self) -> Self {
        Self {
            sessions: self.sessions.clone(),
            cookie_config: self.cookie_config.clone(),
            bypass: self.bypass.clone(),
            _payload: PhantomData,
        }
    }
}

impl<C: fmt::Debug, P> fmt::Debug for AuthManagerLayer<C, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthManagerLayer")
            .field("sessions", &self.sessions)
            .field("cookie_config", &self.cookie_config)
            .field("bypass", &self.bypass)
            .finish()
    }
}

impl<C: CacheClient, P> AuthManagerLayer<C, P> {
    /// Create a new [`AuthManagerLayer`] with the provided session store and
    /// default cookie configuration.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use recipe_backend::{
    ///     recipe_backend_core::SessionStore, AuthManagerLayer, MemoryCache, SessionData,
    /// };
    ///
    /// let sessions = SessionStore::new(MemoryCache::default());
    /// let auth_layer = AuthManagerLayer::<_, SessionData>::new(sessions);
    /// ```
    pub fn new(sessions: SessionStore<C>) -> Self {
        Self {
            sessions,
            cookie_config: Arc::new(CookieConfig::default()),
            bypass: Bypass::default(),
            _payload: PhantomData,
        }
    }

    /// Configures the session cookie.
    pub fn with_cookie_config(mut self, cookie_config: CookieConfig) -> Self {
        self.cookie_config = Arc::new(cookie_config);
        self
    }

    /// Skip session handling for requests matching `bypass`.
    ///
    /// Bypassed requests never touch the cache and carry no
    /// [`CurrentSession`].
    pub fn with_bypass<F>(mut self, bypass: F) -> Self
    where
        F: Fn(&Uri) -> bool + Send + Sync + 'static,
    {
        self.bypass = Bypass(Some(Arc::new(bypass)));
        self
    }

    /// Skip session handling for requests whose path is `prefix` or lies
    /// below it.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use recipe_backend::{
    ///     recipe_backend_core::SessionStore, AuthManagerLayer, MemoryCache, SessionData,
    /// };
    ///
    /// let sessions = SessionStore::new(MemoryCache::default());
    /// let auth_layer =
    ///     AuthManagerLayer::<_, SessionData>::new(sessions).with_bypass_prefix("/api/v1/health");
    /// ```
    pub fn with_bypass_prefix(self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        self.with_bypass(move |uri| is_under(uri.path(), &prefix))
    }
}

impl<S, C: CacheClient, P> Layer<S> for AuthManagerLayer<C, P> {
    type Service = CookieManager<AuthManager<S, C, P>>;

    fn layer(&self, inner: S) -> Self::Service {
        let auth_manager = AuthManager {
            inner,
            sessions: self.sessions.clone(),
            cookie_config: self.cookie_config.clone(),
            bypass: self.bypass.clone(),
            _payload: PhantomData,
        };

        CookieManager::new(auth_manager)
    }
}
