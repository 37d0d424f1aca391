//! User accounts.
use std::fmt::{self, Display};

use uuid::Uuid;

/// Identifier of a user account.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct UserId(Uuid);

impl UserId {
    /// Generate a new time-ordered id.
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0.hyphenated(), f)
    }
}

impl From<Uuid> for UserId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// A stored user account.
///
/// Emails are unique across accounts. The password is only ever kept as the
/// hash produced by a [`PasswordHasher`](crate::PasswordHasher).
#[derive(Clone, PartialEq, Eq)]
pub struct User {
    /// The account id.
    pub id: UserId,

    /// The email the user signs in with.
    pub email: String,

    /// The encoded password hash.
    pub password_hash: String,
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("password_hash", &"..")
            .finish()
    }
}
