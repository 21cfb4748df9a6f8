//! # strata-schema
//!
//! Schema snapshot model for the Strata migration engine.
//!
//! A [`SchemaSnapshot`] describes one PostgreSQL schema namespace: its tables
//! and columns, indexes, constraints, triggers, enum types and extensions.
//! Both sides of a comparison use it. The desired side is built from
//! declarations and the actual side from introspection of a live database.
//!
//! ## Naming
//!
//! Every index and constraint the engine creates gets a deterministic name
//! derived from its semantic identity (see [`naming`]). Renaming a table or
//! column changes the computed name, which lets the differ emit a cheap
//! `RENAME CONSTRAINT` instead of a drop and re-create.
//!
//! ## Example
//!
//! ```rust
//! use strata_schema::{ColumnInfo, NamingPolicy, PrimaryKeyDefinition, SchemaSnapshot, TableInfo};
//!
//! let desired = SchemaSnapshot::new()
//!     .table(
//!         TableInfo::new("users")
//!             .column(ColumnInfo::new("id", "bigserial").not_null())
//!             .column(ColumnInfo::new("email", "text").not_null()),
//!     )
//!     .primary_key("users", PrimaryKeyDefinition::new(["id"]))
//!     .normalized(NamingPolicy::verbatim());
//!
//! assert!(desired.validate().is_ok());
//! assert_eq!(desired.primary_key_of("users").map(|pk| pk.name.as_str()), Some("users_pkey"));
//! ```

pub mod column;
pub mod constraint;
pub mod error;
pub mod naming;
pub mod snapshot;
pub mod table;

pub use column::{ColumnAttribute, ColumnInfo, Identity, encode_default};
pub use constraint::{
    CheckDefinition, Constraint, ForeignKeyAction, ForeignKeyDefinition, IndexDefinition,
    PrimaryKeyDefinition, TriggerDefinition, UniqueDefinition, rewrite_identifiers,
};
pub use error::{SchemaError, SchemaResult};
pub use naming::NamingPolicy;
pub use snapshot::{ConstraintMap, SchemaSnapshot};
pub use table::TableInfo;
