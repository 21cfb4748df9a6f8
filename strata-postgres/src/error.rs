//! Error types for PostgreSQL operations.

use strata_migrate::DatabaseError;
use thiserror::Error;

/// Result type for PostgreSQL operations.
pub type PgResult<T> = Result<T, PgError>;

/// Errors that can occur during PostgreSQL operations.
#[derive(Error, Debug)]
pub enum PgError {
    /// Connection pool error.
    #[error("pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    /// PostgreSQL error.
    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Connection error.
    #[error("connection error: {0}")]
    Connection(String),
}

impl PgError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Check if this is a connection error.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Pool(_) | Self::Connection(_))
    }
}

/// The server's error exactly as reported: SQLSTATE plus primary message.
///
/// Errors that did not come from the server (I/O, protocol) keep the
/// driver's text and carry no code.
pub fn database_error(err: &tokio_postgres::Error) -> DatabaseError {
    match err.as_db_error() {
        Some(db) => DatabaseError::new(db.code().code(), db.message()),
        None => DatabaseError::message(err.to_string()),
    }
}

impl From<PgError> for DatabaseError {
    fn from(err: PgError) -> Self {
        match err {
            PgError::Postgres(e) => database_error(&e),
            other => DatabaseError::message(other.to_string()),
        }
    }
}
