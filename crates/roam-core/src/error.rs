//! Error types for roam-core

use thiserror::Error;

use crate::remote::GatewayError;

/// Result type alias using roam-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in roam-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Remote gateway error
    #[error("Remote gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Sync engine error
    #[error("Sync error: {0}")]
    Sync(String),
}
