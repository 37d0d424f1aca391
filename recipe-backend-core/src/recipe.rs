//! Recipes and their version timestamps.
use std::{
    fmt::{self, Display},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

/// Identifier of a recipe.
///
/// Recipe ids are time-ordered UUIDs (version 7) generated by the service,
/// never by the store.
#[derive(Copy, Clone, Debug, Deserialize, Serialize, Eq, Hash, PartialEq, PartialOrd, Ord)]
#[serde(transparent)]
pub struct RecipeId(Uuid);

impl RecipeId {
    /// Generate a new time-ordered id.
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }

    /// Wrap an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Display for RecipeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0.hyphenated(), f)
    }
}

impl FromStr for RecipeId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for RecipeId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// A stored recipe.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Recipe {
    /// The recipe id.
    pub id: RecipeId,

    /// The title.
    pub title: String,

    /// The body of the recipe.
    pub content: String,

    /// When the recipe was created. Never changes.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// When the recipe was last changed.
    ///
    /// This doubles as the recipe's version: an update is only accepted when
    /// the caller presents the current value.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// The fields of a recipe about to be created.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct NewRecipe {
    /// The title.
    pub title: String,

    /// The body of the recipe.
    pub content: String,
}

/// The fields written by an update.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct RecipeUpdate {
    /// The new title.
    pub title: String,

    /// The new body.
    pub content: String,
}

/// The current time at the precision the relational store keeps.
///
/// Timestamps are truncated to whole microseconds so that a version read back
/// from the store compares equal to the one that was written.
pub fn now_version() -> OffsetDateTime {
    truncate_to_micros(OffsetDateTime::now_utc())
}

/// The version to write when replacing `previous`.
///
/// Always strictly later than `previous`, even if the clock has not advanced
/// (or went backwards) since it was written.
///
/// # Examples
///
/// ```rust
/// use recipe_backend_core::recipe::{next_version, now_version};
///
/// let v1 = now_version();
/// let v2 = next_version(v1);
/// assert!(v2 > v1);
/// ```
pub fn next_version(previous: OffsetDateTime) -> OffsetDateTime {
    let now = now_version();
    if now > previous {
        now
    } else {
        truncate_to_micros(previous) + Duration::microseconds(1)
    }
}

fn truncate_to_micros(datetime: OffsetDateTime) -> OffsetDateTime {
    let nanos = datetime.nanosecond() / 1_000 * 1_000;
    datetime.replace_nanosecond(nanos).unwrap_or(datetime)
}
