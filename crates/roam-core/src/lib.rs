//! roam-core - Core library for Roam
//!
//! This crate contains the shared models, local database layer, remote
//! document-store gateways, and the offline-first sync engine used by all
//! Roam interfaces (mobile, CLI).

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod remote;
pub mod sync;
mod util;

pub use error::{Error, Result};
pub use models::{Favorite, FavoriteId, Review, ReviewId, RouteId, RouteStop, TravelRoute};
pub use sync::{EntityKind, SyncOutcome, SyncService};
