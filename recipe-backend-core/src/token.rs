//! Module for session tokens.

use std::{
    fmt::{self, Display},
    str::FromStr,
};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;

/// An error returned when a string is not a valid [`Token`].
#[derive(thiserror::Error, Debug)]
pub enum ParseTokenError {
    /// The string has the wrong length.
    #[error("token must be 27 characters long, got {0}")]
    Length(usize),

    /// The string is not URL-safe base64.
    #[error("token is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),
}

/// Number of random bytes in a token.
pub const TOKEN_BYTES: usize = 20;

/// Length of a token once encoded.
pub const ENCODED_TOKEN_LEN: usize = 27;

/// An opaque session token.
///
/// Wraps 20 bytes from a cryptographically secure source. Tokens are encoded
/// with the URL-safe base64 alphabet without padding, which is also safe to
/// use as a cookie value and as a cache key.
///
/// Tokens are only ever created by the server, see [`Token::generate`].
///
/// # Examples
///
/// ```rust
/// use recipe_backend_core::Token;
///
/// let token = Token::generate();
/// let parsed: Token = token.to_string().parse().unwrap();
/// assert_eq!(token, parsed);
/// ```
#[derive(Copy, Clone, Eq, Hash, PartialEq)]
pub struct Token([u8; TOKEN_BYTES]);

impl Token {
    /// Create a token from the thread-local CSPRNG provided by the `rand`
    /// crate ([`rand::rngs::ThreadRng`]).
    pub fn generate() -> Self {
        Self::generate_with_rng(&mut rand::thread_rng())
    }

    /// Create a token from the provided random number generator.
    pub fn generate_with_rng<R: RngCore + rand::CryptoRng>(rng: &mut R) -> Self {
        let mut bytes = [0; TOKEN_BYTES];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&URL_SAFE_NO_PAD.encode(self.0))
    }
}

// Tokens are credentials; keep them out of logs.
impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(..)")
    }
}

impl FromStr for Token {
    type Err = ParseTokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != ENCODED_TOKEN_LEN {
            return Err(ParseTokenError::Length(s.len()));
        }

        let decoded = URL_SAFE_NO_PAD.decode(s)?;
        let bytes = <[u8; TOKEN_BYTES]>::try_from(decoded.as_slice())
            .map_err(|_| ParseTokenError::Length(s.len()))?;

        Ok(Self(bytes))
    }
}

impl TryFrom<&str> for Token {
    type Error = ParseTokenError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.parse()
    }
}
