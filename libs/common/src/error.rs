//! Custom error types for the common library
//!
//! This module defines the database error taxonomy shared by the
//! civicgrid services. Store failures must surface as one of these
//! variants; callers never interpret them as an empty result.

use sqlx::Error as SqlxError;
use thiserror::Error;

/// Custom error type for database operations
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Error occurred during database connection
    #[error("Database connection error: {0}")]
    Connection(#[source] SqlxError),

    /// Error occurred during database query execution
    #[error("Database query error: {0}")]
    Query(#[source] SqlxError),

    /// A stored value could not be mapped back into a domain type
    #[error("Database decode error: {0}")]
    Decode(String),

    /// Configuration error
    #[error("Database configuration error: {0}")]
    Configuration(String),
}

/// Type alias for Result with DatabaseError
pub type DatabaseResult<T> = Result<T, DatabaseError>;
