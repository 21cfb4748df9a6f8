//! Error types for snapshot construction and validation.

// These warnings are false positives - the fields are used by derive macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Result type for schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Errors that can occur while building or validating a snapshot.
#[derive(Error, Debug, Diagnostic)]
pub enum SchemaError {
    /// A table carries more than one primary key.
    #[error("table `{table}` has {count} primary keys, expected at most one")]
    #[diagnostic(code(strata::schema::multiple_primary_keys))]
    MultiplePrimaryKeys { table: String, count: usize },

    /// A constraint or index is attached to a table the snapshot does not contain.
    #[error("{kind} `{name}` references unknown table `{table}`")]
    #[diagnostic(code(strata::schema::unknown_table))]
    UnknownTable {
        kind: String,
        name: String,
        table: String,
    },

    /// A constraint lists a column the owning table does not have.
    #[error("{kind} `{name}` references unknown column `{table}.{column}`")]
    #[diagnostic(code(strata::schema::unknown_column))]
    UnknownColumn {
        kind: String,
        name: String,
        table: String,
        column: String,
    },

    /// A constraint has no columns.
    #[error("{kind} on `{table}` has no columns")]
    #[diagnostic(code(strata::schema::empty_constraint))]
    EmptyConstraint { kind: String, table: String },

    /// A column default is not in `{hash}:{expression}` form.
    #[error("invalid default `{value}` on column `{column}`")]
    #[diagnostic(
        code(strata::schema::invalid_default),
        help("defaults are stored as `<8-hex-hash>:<sql expression>`")
    )]
    InvalidDefault { column: String, value: String },

    /// Snapshot JSON could not be parsed.
    #[error("failed to parse snapshot: {0}")]
    #[diagnostic(code(strata::schema::parse))]
    Parse(#[from] serde_json::Error),
}

impl SchemaError {
    /// Create an unknown table error.
    pub fn unknown_table(
        kind: impl Into<String>,
        name: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self::UnknownTable {
            kind: kind.into(),
            name: name.into(),
            table: table.into(),
        }
    }

    /// Create an unknown column error.
    pub fn unknown_column(
        kind: impl Into<String>,
        name: impl Into<String>,
        table: impl Into<String>,
        column: impl Into<String>,
    ) -> Self {
        Self::UnknownColumn {
            kind: kind.into(),
            name: name.into(),
            table: table.into(),
            column: column.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SchemaError::MultiplePrimaryKeys {
            table: "users".to_string(),
            count: 2,
        };
        assert!(err.to_string().contains("users"));
        assert!(err.to_string().contains('2'));
    }

    #[test]
    fn test_unknown_column_display() {
        let err = SchemaError::unknown_column("index", "users_idx", "users", "email");
        assert_eq!(
            err.to_string(),
            "index `users_idx` references unknown column `users.email`"
        );
    }
}
