//! Data models for Roam

mod favorite;
mod review;
mod route;

pub use favorite::{Favorite, FavoriteId};
pub use review::{round_rating, Review, ReviewId, MAX_RATING, MIN_RATING};
pub use route::{RouteId, RouteStop, TravelRoute};
