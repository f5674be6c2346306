//! Entity kinds and the record contract the sync engine works over

use std::fmt;

use crate::models::{Favorite, Review, TravelRoute};

/// The three replicated entity types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Favorite,
    Review,
    Route,
}

impl EntityKind {
    /// Every replicated kind, in the order full sync cycles visit them
    pub const ALL: [Self; 3] = [Self::Favorite, Self::Review, Self::Route];

    /// Singular lowercase name, used in logs
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Favorite => "favorite",
            Self::Review => "review",
            Self::Route => "route",
        }
    }

    /// Name of the remote collection holding this kind's documents
    #[must_use]
    pub const fn collection(self) -> &'static str {
        match self {
            Self::Favorite => "favorites",
            Self::Review => "reviews",
            Self::Route => "routes",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the generic replicator needs to know about a record
pub trait SyncRecord: Clone + Send + Sync + 'static {
    /// Which replicated entity this record belongs to
    const KIND: EntityKind;

    /// Stable string id; doubles as the remote document key
    fn record_id(&self) -> String;
}

impl SyncRecord for Favorite {
    const KIND: EntityKind = EntityKind::Favorite;

    fn record_id(&self) -> String {
        self.id.as_str()
    }
}

impl SyncRecord for Review {
    const KIND: EntityKind = EntityKind::Review;

    fn record_id(&self) -> String {
        self.id.as_str()
    }
}

impl SyncRecord for TravelRoute {
    const KIND: EntityKind = EntityKind::Route;

    fn record_id(&self) -> String {
        self.id.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_kind_names() {
        assert_eq!(EntityKind::Favorite.as_str(), "favorite");
        assert_eq!(EntityKind::Review.collection(), "reviews");
        assert_eq!(EntityKind::Route.to_string(), "route");
        assert_eq!(EntityKind::ALL.len(), 3);
    }

    #[test]
    fn test_record_id_matches_model_id() {
        let favorite = Favorite::new("u-1", "p-1", "Harbor", None);
        assert_eq!(favorite.record_id(), favorite.id.as_str());

        let route = TravelRoute::new("u-1", "Day one", None, vec![]);
        assert_eq!(route.record_id(), route.id.as_str());
    }
}
