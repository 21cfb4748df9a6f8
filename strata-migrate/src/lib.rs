//! # strata-migrate
//!
//! Zero-downtime migration engine for PostgreSQL.
//!
//! This crate provides functionality for:
//! - Resolving recorded rename intents into one rename per entity
//! - Structural diffing of a desired and an actual [`SchemaSnapshot`]
//! - Generating reversible changesets for every kind of schema object
//! - Ordering changesets into expand, alter and contract phases
//! - Executing migration units with transaction grouping and rollback plans
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────┐   ┌────────────┐
//! │ Rename       │──▶│ Align actual │──▶│ Differ   │──▶│ Generators │
//! │ Resolver     │   │ snapshot     │   │          │   │            │
//! └──────────────┘   └──────────────┘   └──────────┘   └────────────┘
//!                                                            │
//!                                                            ▼
//!                    ┌──────────────┐   ┌────────────────────────────┐
//!                    │ Phased       │◀──│ Expand / Alter / Contract  │
//!                    │ Migrator     │   │ program                    │
//!                    └──────────────┘   └────────────────────────────┘
//! ```
//!
//! Expand adds objects without breaking running code, alter changes objects
//! in place and contract removes what is no longer declared. Renames run at
//! the start of alter, so expand statements still address renamed tables and
//! columns by their previous names.
//!
//! ## Example
//!
//! ```rust,ignore
//! use strata_migrate::{MigrateConfig, PhasedMigrator, Planner};
//!
//! async fn migrate(
//!     desired: &strata_schema::SchemaSnapshot,
//!     actual: &strata_schema::SchemaSnapshot,
//!     conn: &mut dyn strata_migrate::MigrationConnection,
//! ) -> Result<(), Box<dyn std::error::Error>> {
//!     let config = MigrateConfig::load("strata.toml").await?;
//!     let plan = Planner::new(config).plan_with_intents(desired, actual).await?;
//!     println!("Plan: {}", plan.summary());
//!     println!("{}", plan.program().render_up());
//!
//!     let units = plan
//!         .program()
//!         .into_units("20260101000000")
//!         .into_iter()
//!         .map(|u| Box::new(u) as Box<dyn strata_migrate::MigrationUnit>)
//!         .collect();
//!     let result = PhasedMigrator::new(units)?.migrate_to_latest(conn).await;
//!     if let Some(err) = result.error {
//!         eprintln!("{}", err);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! [`SchemaSnapshot`]: strata_schema::SchemaSnapshot

pub mod align;
pub mod changeset;
pub mod config;
pub mod context;
pub mod diff;
pub mod error;
pub mod execute;
pub mod generators;
pub mod intents;
pub mod migrator;
pub mod plan;
pub mod program;
pub mod rename;

// Re-exports
pub use align::align;
pub use changeset::{Changeset, ChangesetKind, Operation, Phase, Warning, WarningKind};
pub use config::{CONFIG_FILE_NAME, MigrateConfig};
pub use context::GeneratorContext;
pub use diff::{Arity, Change, ConstraintDiff, DiffKind, Difference, diff};
pub use error::{DatabaseError, MigrateResult, MigrationError};
pub use execute::{run_operation, run_operations};
pub use intents::{IntentRecord, IntentStore};
pub use migrator::{
    Direction, ExecutionResult, MigrationConnection, MigrationTarget, MigrationUnit,
    PhasedMigrator, UnitGroup, UnitResult, UnitStatus,
};
pub use plan::{ExpandAlterContract, MigrationPlan, Planner, order};
pub use program::{MigrationProgram, OperationUnit};
pub use rename::{
    RenameIntent, RenameKind, RenamePair, RenameResolver, ResolvedRenames, StaleReason,
    StaleRename,
};
