use async_trait::async_trait;
use axum_core::extract::FromRequestParts;
use http::{request::Parts, StatusCode};

use crate::session::CurrentSession;

#[async_trait]
impl<S, P> FromRequestParts<S> for CurrentSession<P>
where
    S: Sync + Send,
    P: Clone + Send + Sync + 'static,
{
    type Rejection = (http::StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<CurrentSession<P>>().cloned().ok_or((
            StatusCode::INTERNAL_SERVER_ERROR,
            "Can't extract session. Is `AuthManagerLayer` enabled?",
        ))
    }
}
