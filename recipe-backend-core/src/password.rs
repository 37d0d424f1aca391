//! Password hashing.
//!
//! The algorithm is left to the application. Hashing is expected to be slow
//! on purpose, so [`UserService`](crate::UserService) runs it on the blocking
//! thread pool.

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A hasher failed to hash or could not read a stored hash.
#[derive(thiserror::Error, Debug)]
#[error("password hashing failed: {0}")]
pub struct PasswordError(#[source] pub BoxError);

impl PasswordError {
    /// Wrap any error.
    pub fn new<E: Into<BoxError>>(err: E) -> Self {
        Self(err.into())
    }
}

/// Turns passwords into storable hashes and checks passwords against them.
pub trait PasswordHasher: Send + Sync + 'static {
    /// Hash `password` with a fresh salt, returning a self-describing string.
    fn hash(&self, password: &str) -> Result<String, PasswordError>;

    /// Returns `true` if `password` produced `hash`.
    ///
    /// A mismatch is `Ok(false)`; `Err` means `hash` could not be read.
    fn verify(&self, password: &str, hash: &str) -> Result<bool, PasswordError>;
}
