//! Error types for the service registry.

use thiserror::Error;

/// Service registry error type.
///
/// Every public operation returns either a value or one of these variants;
/// no unhandled error crosses the component boundary. Backend failures are
/// surfaced unmodified — retry policy belongs to the caller.
#[derive(Error, Debug)]
pub enum Error {
    /// A required field is missing or malformed.
    #[error("validation failed: {0}")]
    Validation(String),

    /// No record exists for the given service id.
    #[error("service not found: {0}")]
    NotFound(String),

    /// The domain is already registered.
    #[error("domain already registered: {0}")]
    Duplicate(String),

    /// The principal's tier or tenant scope is insufficient.
    #[error("not authorized: {0}")]
    Authorization(String),

    /// The storage backend failed.
    #[error("backend error: {0}")]
    Backend(#[from] sled::Error),

    /// A record could not be encoded or decoded.
    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
