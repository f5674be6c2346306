//! Database layer for Roam

mod connection;
mod favorites;
mod migrations;
mod reviews;
mod routes;

pub use connection::Database;
pub use favorites::FavoriteRepository;
pub use reviews::ReviewRepository;
pub use routes::RouteRepository;
