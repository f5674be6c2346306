//! Place review model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Lowest accepted star rating
pub const MIN_RATING: f64 = 0.5;

/// Highest accepted star rating
pub const MAX_RATING: f64 = 5.0;

/// Round a rating to the one-decimal precision the app works in
#[must_use]
pub fn round_rating(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// A unique identifier for a review, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReviewId(Uuid);

impl ReviewId {
    /// Create a new unique review ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for ReviewId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ReviewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ReviewId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A user-authored review of a place
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    /// Unique identifier
    pub id: ReviewId,
    /// Authoring user
    pub user_id: String,
    /// Identifier of the reviewed place
    pub place_id: String,
    /// Star rating, one-decimal precision
    pub rating: f64,
    /// Free-form review text
    pub comment: String,
    /// How many readers marked this review helpful
    pub helpful_count: i64,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
    /// Whether this record has reached the remote store
    pub synced: bool,
}

impl Review {
    /// Create a new, not yet synced review. The rating is rounded to one
    /// decimal; range validation happens at the service boundary.
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        place_id: impl Into<String>,
        rating: f64,
        comment: impl Into<String>,
    ) -> Self {
        let now = crate::util::now_millis();
        Self {
            id: ReviewId::new(),
            user_id: user_id.into(),
            place_id: place_id.into(),
            rating: round_rating(rating),
            comment: comment.into(),
            helpful_count: 0,
            created_at: now,
            updated_at: now,
            synced: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_review_id_unique() {
        let id1 = ReviewId::new();
        let id2 = ReviewId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_review_new() {
        let review = Review::new("user-1", "place-2", 4.5, "Great views at sunset");
        assert_eq!(review.place_id, "place-2");
        assert!((review.rating - 4.5).abs() < f64::EPSILON);
        assert_eq!(review.helpful_count, 0);
        assert!(!review.synced);
        assert_eq!(review.created_at, review.updated_at);
    }

    #[test]
    fn test_round_rating() {
        assert!((round_rating(4.449) - 4.4).abs() < f64::EPSILON);
        assert!((round_rating(4.45) - 4.5).abs() < f64::EPSILON);
        assert!((round_rating(5.0) - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_rating_survives_json_round_trip() {
        let review = Review::new("user-1", "place-2", 4.5, "ok");
        let encoded = serde_json::to_string(&review).unwrap();
        let decoded: Review = serde_json::from_str(&encoded).unwrap();
        assert!((decoded.rating - 4.5).abs() < f64::EPSILON);
    }
}
