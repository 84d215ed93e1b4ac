//! Error types for the engagement and feed services
//!
//! Provides unified error handling using thiserror. Backend errors
//! (`StoreError`, `CacheError`) never reach callers directly: the service
//! layer logs them with context and maps them onto `AppError`.

use thiserror::Error;

// == App Error Enum ==
/// Error surfaced by every public service operation.
///
/// `Clone` so a single coalesced load result can be handed to every waiter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// Rejected before any store access (bad ids, kinds or content)
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Target is absent or soft-deleted
    #[error("Not found: {0}")]
    NotFound(String),

    /// Caller does not own the resource it tried to change
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Store or transaction failure; details are logged, not carried
    #[error("Internal error: {0}")]
    Server(String),
}

impl AppError {
    /// Generic server error; the cause must already be logged by the caller.
    pub fn server() -> Self {
        AppError::Server("internal server error".to_string())
    }
}

// == Store Error Enum ==
/// Failure reported by a durable store backend.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Error returned by the PostgreSQL driver
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored code could not be mapped onto a domain value
    #[error("decode error: {0}")]
    Decode(String),

    /// Row already exists under a uniqueness constraint
    #[error("conflict: {0}")]
    Conflict(String),

    /// Backend is unreachable or refused the operation
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

// == Cache Error Enum ==
/// Failure reported by a shared cache backend.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Error returned by the Redis client
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Key rejected before reaching the backend
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Operation against a key holding the wrong kind of value
    #[error("wrong value type for key: {0}")]
    WrongType(String),

    /// Cache is unreachable
    #[error("cache unavailable: {0}")]
    Unavailable(String),
}

// == Result Type Aliases ==
/// Convenience Result type for service operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Result type for durable store calls.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result type for shared cache calls.
pub type CacheResult<T> = std::result::Result<T, CacheError>;
