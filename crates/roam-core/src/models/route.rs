//! Travel route model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A unique identifier for a travel route, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RouteId(Uuid);

impl RouteId {
    /// Create a new unique route ID using UUID v7
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

impl Default for RouteId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RouteId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// One stop on a route. `position` is the authoritative ordinal; stop order
/// never depends on where the stop sits in a vector or a JSON array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteStop {
    /// Identifier of the place in the places catalog
    pub place_id: String,
    /// Display name of the stop
    pub name: String,
    /// Zero-based ordinal within the route
    pub position: i64,
}

impl RouteStop {
    /// Create a stop at the given ordinal
    #[must_use]
    pub fn new(place_id: impl Into<String>, name: impl Into<String>, position: i64) -> Self {
        Self {
            place_id: place_id.into(),
            name: name.into(),
            position,
        }
    }
}

/// A user-assembled sequence of places to visit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TravelRoute {
    /// Unique identifier
    pub id: RouteId,
    /// Owning user
    pub owner_id: String,
    /// Route name
    pub name: String,
    /// Optional free-form description
    pub summary: Option<String>,
    /// Stops ordered by their `position` ordinal
    pub stops: Vec<RouteStop>,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
    /// Whether this record has reached the remote store
    pub synced: bool,
}

impl TravelRoute {
    /// Create a new, not yet synced route. Stops are sorted by ordinal so the
    /// in-memory order always matches `position`.
    #[must_use]
    pub fn new(
        owner_id: impl Into<String>,
        name: impl Into<String>,
        summary: Option<String>,
        mut stops: Vec<RouteStop>,
    ) -> Self {
        let now = crate::util::now_millis();
        stops.sort_by_key(|stop| stop.position);
        Self {
            id: RouteId::new(),
            owner_id: owner_id.into(),
            name: name.into(),
            summary,
            stops,
            created_at: now,
            updated_at: now,
            synced: false,
        }
    }
}
