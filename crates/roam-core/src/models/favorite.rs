//! Favorite place model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A unique identifier for a favorite, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FavoriteId(Uuid);

impl FavoriteId {
    /// Create a new unique favorite ID using UUID v7
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

impl Default for FavoriteId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FavoriteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for FavoriteId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A place the user bookmarked for later
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Favorite {
    /// Unique identifier
    pub id: FavoriteId,
    /// Owning user
    pub user_id: String,
    /// Identifier of the place in the places catalog
    pub place_id: String,
    /// Display name of the place, captured at bookmark time
    pub place_name: String,
    /// Optional category label (museum, viewpoint, food, ...)
    pub category: Option<String>,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
    /// Whether this record has reached the remote store
    pub synced: bool,
}

impl Favorite {
    /// Create a new, not yet synced favorite for the given user and place
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        place_id: impl Into<String>,
        place_name: impl Into<String>,
        category: Option<String>,
    ) -> Self {
        let now = crate::util::now_millis();
        Self {
            id: FavoriteId::new(),
            user_id: user_id.into(),
            place_id: place_id.into(),
            place_name: place_name.into(),
            category,
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
    fn test_favorite_id_unique() {
        let id1 = FavoriteId::new();
        let id2 = FavoriteId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_favorite_id_parse() {
        let id = FavoriteId::new();
        let parsed: FavoriteId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_favorite_new() {
        let favorite = Favorite::new("user-1", "place-9", "Senso-ji", Some("temple".to_string()));
        assert_eq!(favorite.user_id, "user-1");
        assert_eq!(favorite.place_id, "place-9");
        assert_eq!(favorite.place_name, "Senso-ji");
        assert_eq!(favorite.category.as_deref(), Some("temple"));
        assert!(!favorite.synced);
        assert!(favorite.created_at > 0);
        assert_eq!(favorite.created_at, favorite.updated_at);
    }
}
