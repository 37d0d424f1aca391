//! The session attached to each request.
use recipe_backend_core::Token;

/// The session of the visitor making the current request.
///
/// The authentication middleware inserts one into the request extensions of
/// every request it does not bypass; handlers take it with the
/// [`FromRequestParts`](axum_core::extract::FromRequestParts) extractor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CurrentSession<P> {
    /// No session cookie was sent, or it named no live session.
    Anonymous,

    /// A live session.
    Authenticated {
        /// The token the session is stored under.
        token: Token,

        /// The payload stored for the session.
        payload: P,
    },
}

impl<P> CurrentSession<P> {
    /// A session with no visitor identity.
    pub fn anonymous() -> Self {
        Self::Anonymous
    }

    /// A session loaded from the cache.
    pub fn authenticated(token: Token, payload: P) -> Self {
        Self::Authenticated { token, payload }
    }

    /// Returns `true` if the visitor is signed in.
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated { .. })
    }

    /// The session token, if signed in.
    pub fn token(&self) -> Option<&Token> {
        match self {
            Self::Anonymous => None,
            Self::Authenticated { token, .. } => Some(token),
        }
    }

    /// The session payload, if signed in.
    pub fn payload(&self) -> Option<&P> {
        match self {
            Self::Anonymous => None,
            Self::Authenticated { payload, .. } => Some(payload),
        }
    }

    /// Consume the session, returning its payload if signed in.
    pub fn into_payload(self) -> Option<P> {
        match self {
            Self::Anonymous => None,
            Self::Authenticated { payload, .. } => Some(payload),
        }
    }
}

impl<P> Default for CurrentSession<P> {
    fn default() -> Self {
        Self::Anonymous
    }
}
