//! Error types for the migration engine.

use strata_schema::SchemaError;
use thiserror::Error;

/// Result type alias for migration operations.
pub type MigrateResult<T> = Result<T, MigrationError>;

/// SQLSTATE for `unique_violation`.
pub const UNIQUE_VIOLATION: &str = "23505";

/// An error reported by the database, kept exactly as the server sent it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct DatabaseError {
    /// SQLSTATE code, when the error came from the server.
    pub code: Option<String>,
    /// Server message.
    pub message: String,
}

impl DatabaseError {
    /// Error with a SQLSTATE code.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
        }
    }

    /// Error without a SQLSTATE code (client side, I/O).
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    /// Whether this is a unique violation.
    pub fn is_unique_violation(&self) -> bool {
        self.code.as_deref() == Some(UNIQUE_VIOLATION)
    }
}

/// Errors that can occur during migration operations.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// File system error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration file could not be parsed.
    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration file could not be written.
    #[error("Config serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A rename intent file is malformed.
    #[error("Rename intent file error: {0}")]
    IntentFile(String),

    /// Rename intents form a cycle.
    #[error("Rename cycle in `{scope}`: {}", path.join(" -> "))]
    RenameCycle {
        /// Schema or `schema.table` the cycle lives in.
        scope: String,
        /// Names along the cycle, first name repeated at the end.
        path: Vec<String>,
    },

    /// A difference no generator can express.
    #[error("Unresolvable difference at {}", path.join("."))]
    UnresolvableDiff {
        /// Path of the difference.
        path: Vec<String>,
    },

    /// A snapshot failed validation.
    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(#[from] SchemaError),

    /// The program would drop data and that is not allowed.
    #[error("Data loss would occur: {0}")]
    DataLoss(String),

    /// Migration units do not form a single dependency chain.
    #[error("Invalid migration dependency chain: {0}")]
    DependencyChain(String),

    /// Migration not found.
    #[error("Migration '{0}' not found")]
    NotFound(String),

    /// The database rejected a statement.
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl MigrationError {
    /// Create an intent file error.
    pub fn intent_file(msg: impl Into<String>) -> Self {
        Self::IntentFile(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a data loss error.
    pub fn data_loss(msg: impl Into<String>) -> Self {
        Self::DataLoss(msg.into())
    }

    /// Create a dependency chain error.
    pub fn dependency_chain(msg: impl Into<String>) -> Self {
        Self::DependencyChain(msg.into())
    }

    /// Create an unresolvable difference error.
    pub fn unresolvable<I, S>(path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::UnresolvableDiff {
            path: path.into_iter().map(Into::into).collect(),
        }
    }

    /// The database error behind this error, if any.
    pub fn as_database(&self) -> Option<&DatabaseError> {
        match self {
            Self::Database(err) => Some(err),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_error_display_is_verbatim() {
        let err = DatabaseError::new(
            "23505",
            "could not create unique index \"users_email_idx\"",
        );
        assert_eq!(
            err.to_string(),
            "could not create unique index \"users_email_idx\""
        );
        assert!(err.is_unique_violation());

        let wrapped = MigrationError::from(err.clone());
        assert_eq!(wrapped.to_string(), err.to_string());
        assert_eq!(wrapped.as_database(), Some(&err));
    }

    #[test]
    fn test_rename_cycle_display() {
        let err = MigrationError::RenameCycle {
            scope: "public".to_string(),
            path: vec!["a".to_string(), "b".to_string(), "a".to_string()],
        };
        assert_eq!(err.to_string(), "Rename cycle in `public`: a -> b -> a");
    }

    #[test]
    fn test_unresolvable_display() {
        let err = MigrationError::unresolvable(["extension", "pgcrypto"]);
        assert_eq!(err.to_string(), "Unresolvable difference at extension.pgcrypto");
    }

    #[test]
    fn test_message_only_error_is_not_unique_violation() {
        assert!(!DatabaseError::message("connection reset").is_unique_violation());
    }
}
