use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

const REVIEW_PREFIX: &str = "rev_";

/// Identifier of a stored review: `rev_` followed by a UUIDv7.
///
/// UUIDv7 is time-ordered, so comparing two ids as strings orders them by
/// creation. The store uses that to break `created_at` ties.
#[derive(Clone, Debug, Hash, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReviewId(String);

impl ReviewId {
    pub fn new() -> Self {
        Self(format!("{REVIEW_PREFIX}{}", Uuid::now_v7()))
    }

    /// Wrap an id read back from storage. No format check is applied.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The UUID part, if the id has the expected shape.
    pub fn uuid(&self) -> Option<Uuid> {
        self.0
            .strip_prefix(REVIEW_PREFIX)
            .and_then(|rest| Uuid::parse_str(rest).ok())
    }
}

impl Default for ReviewId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ReviewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
