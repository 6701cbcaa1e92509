//! Review domain types: the validated submission, the derived insights and
//! the persisted [`FeedbackRecord`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::ReviewId;

/// Client-correctable input errors. The messages are part of the HTTP
/// contract and must not change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("rating must be an integer between 1 and 5")]
    InvalidRating,
    #[error("reviewText cannot be empty")]
    EmptyReviewText,
}

/// Star rating, always within 1..=5.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Rating(u8);

impl Rating {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(value: i64) -> Result<Self, ValidationError> {
        if (i64::from(Self::MIN)..=i64::from(Self::MAX)).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(ValidationError::InvalidRating)
        }
    }

    /// Coerce a loosely-typed JSON value into a rating.
    ///
    /// Integers, floats with no fractional part and numeric strings are
    /// accepted. Booleans, null, objects and arrays are not.
    pub fn from_json(value: &Value) -> Result<Self, ValidationError> {
        let number = match value {
            Value::Number(n) => n.as_i64().map(|i| i as f64).or_else(|| n.as_f64()),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
        .ok_or(ValidationError::InvalidRating)?;

        if !number.is_finite() || number.fract() != 0.0 {
            return Err(ValidationError::InvalidRating);
        }
        // Out-of-range floats saturate and are rejected by `new`.
        Self::new(number as i64)
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for Rating {
    type Error = ValidationError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Rating> for u8 {
    fn from(rating: Rating) -> Self {
        rating.0
    }
}

impl std::fmt::Display for Rating {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A submission that passed validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReviewSubmission {
    pub rating: Rating,
    /// Trimmed, never empty.
    pub review_text: String,
}

impl ReviewSubmission {
    /// Validate a raw `{ rating, reviewText }` body. Rating is checked first.
    pub fn from_json(body: &Value) -> Result<Self, ValidationError> {
        let rating = Rating::from_json(body.get("rating").unwrap_or(&Value::Null))?;

        let review_text = body
            .get("reviewText")
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or_default();
        if review_text.is_empty() {
            return Err(ValidationError::EmptyReviewText);
        }

        Ok(Self {
            rating,
            review_text: review_text.to_string(),
        })
    }
}

/// Text derived from a review by the generation service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Insights {
    pub user_reply: String,
    pub summary: String,
    pub recommended_next: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    #[default]
    Completed,
}

impl std::fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => f.write_str("completed"),
        }
    }
}

impl std::str::FromStr for ReviewStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" => Ok(Self::Completed),
            other => Err(format!("unknown review status: {other}")),
        }
    }
}

/// The durable unit of persisted feedback. Never mutated after creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRecord {
    pub id: ReviewId,
    pub rating: Rating,
    pub review_text: String,
    pub user_reply: String,
    pub summary: String,
    pub recommended_next: String,
    pub status: ReviewStatus,
    pub created_at: DateTime<Utc>,
}
