//! # Strata
//!
//! Zero-downtime schema migrations for PostgreSQL.
//!
//! Strata provides:
//! - A snapshot model describing a desired or an introspected schema
//! - Rename resolution from recorded rename intents
//! - A structural differ and reversible changesets for every object kind
//! - Expand, alter and contract phases so a rolling deploy can straddle a
//!   migration
//! - A phased migrator that groups units by transaction boundary
//!
//! ## Quick Start
//!
//! ```rust
//! use strata::prelude::*;
//!
//! let actual = SchemaSnapshot::new()
//!     .table(TableInfo::new("users").column(ColumnInfo::new("id", "bigserial").not_null()));
//! let desired = SchemaSnapshot::new()
//!     .table(
//!         TableInfo::new("users")
//!             .column(ColumnInfo::new("id", "bigserial").not_null())
//!             .column(ColumnInfo::new("email", "text")),
//!     );
//!
//! let plan = Planner::default().plan(&desired, &actual, &[]).unwrap();
//! assert_eq!(plan.summary(), "1 expand, 0 alter, 0 contract");
//! assert_eq!(
//!     plan.program().render_up(),
//!     "-- expand\nALTER TABLE \"public\".\"users\" ADD COLUMN \"email\" text;\n"
//! );
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

/// Schema snapshot model and constraint naming.
pub mod schema {
    pub use strata_schema::*;
}

/// Planning and executing migrations.
pub mod migrate {
    pub use strata_migrate::*;
}

/// PostgreSQL connections.
#[cfg(feature = "postgres")]
#[cfg_attr(docsrs, doc(cfg(feature = "postgres")))]
pub mod postgres {
    pub use strata_postgres::*;
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::migrate::{
        MigrateConfig, MigrationConnection, MigrationPlan, MigrationProgram, MigrationTarget,
        MigrationUnit, Phase, PhasedMigrator, Planner, RenameIntent,
    };
    pub use crate::schema::{
        CheckDefinition, ColumnInfo, ForeignKeyDefinition, IndexDefinition, PrimaryKeyDefinition,
        SchemaSnapshot, TableInfo, TriggerDefinition, UniqueDefinition,
    };
}

// Re-export key types at the crate root
pub use migrate::{MigrationError, Planner};
pub use schema::{SchemaError, SchemaSnapshot};
