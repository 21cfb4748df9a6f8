//! Shared input of the changeset generators.

use std::collections::{BTreeMap, BTreeSet};

use strata_schema::{NamingPolicy, SchemaSnapshot};

use crate::changeset::Phase;
use crate::rename::ResolvedRenames;

/// Everything a generator may consult besides the difference itself.
///
/// `desired` is the normalized desired snapshot and `actual` the actual
/// snapshot aligned to current names. Table and column arguments of the
/// helpers are current names.
#[derive(Debug, Clone)]
pub struct GeneratorContext<'a> {
    /// Target schema.
    pub schema: String,
    /// Desired snapshot.
    pub desired: &'a SchemaSnapshot,
    /// Aligned actual snapshot.
    pub actual: &'a SchemaSnapshot,
    /// Resolved renames.
    pub renames: &'a ResolvedRenames,
    /// Naming policy the desired snapshot was normalized with.
    pub policy: NamingPolicy,
    /// Build indexes on existing tables concurrently.
    pub concurrent_indexes: bool,
    added_tables: BTreeSet<String>,
    dropped_tables: BTreeSet<String>,
    added_columns: BTreeMap<String, BTreeSet<String>>,
}

impl<'a> GeneratorContext<'a> {
    /// Build the context for one diff run.
    pub fn new(
        schema: impl Into<String>,
        desired: &'a SchemaSnapshot,
        actual: &'a SchemaSnapshot,
        renames: &'a ResolvedRenames,
    ) -> Self {
        let added_tables = desired
            .tables
            .keys()
            .filter(|t| !actual.tables.contains_key(*t))
            .cloned()
            .collect();
        let dropped_tables = actual
            .tables
            .keys()
            .filter(|t| !desired.tables.contains_key(*t))
            .cloned()
            .collect();
        let added_columns = desired
            .tables
            .iter()
            .filter_map(|(name, table)| {
                let existing = actual.tables.get(name)?;
                let added: BTreeSet<String> = table
                    .columns
                    .keys()
                    .filter(|c| !existing.columns.contains_key(*c))
                    .cloned()
                    .collect();
                (!added.is_empty()).then(|| (name.clone(), added))
            })
            .collect();

        Self {
            schema: schema.into(),
            desired,
            actual,
            renames,
            policy: NamingPolicy::default(),
            concurrent_indexes: true,
            added_tables,
            dropped_tables,
            added_columns,
        }
    }

    /// Set the naming policy.
    pub fn with_policy(mut self, policy: NamingPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set whether indexes on existing tables are built concurrently.
    pub fn with_concurrent_indexes(mut self, enabled: bool) -> Self {
        self.concurrent_indexes = enabled;
        self
    }

    /// Whether `table` is created in this run.
    pub fn is_added_table(&self, table: &str) -> bool {
        self.added_tables.contains(table)
    }

    /// Whether `table` is dropped in this run.
    pub fn is_dropped_table(&self, table: &str) -> bool {
        self.dropped_tables.contains(table)
    }

    /// Whether `column` of an existing `table` is added in this run.
    pub fn is_added_column(&self, table: &str, column: &str) -> bool {
        self.added_columns
            .get(table)
            .is_some_and(|c| c.contains(column))
    }

    /// Whether every column is new, either through a new table or as added
    /// columns of an existing one.
    pub fn are_new_columns(&self, table: &str, columns: &[String]) -> bool {
        self.is_added_table(table)
            || (!columns.is_empty() && columns.iter().all(|c| self.is_added_column(table, c)))
    }

    /// Name of `table` as statements of `phase` must address it.
    ///
    /// Renames run early in the alter phase, so expand statements still see
    /// the database names.
    pub fn phase_table(&self, phase: Phase, table: &str) -> String {
        match phase {
            Phase::Expand => self.renames.previous_table_name(&self.schema, table),
            Phase::Alter | Phase::Contract => table.to_string(),
        }
    }

    /// Name of `column` of `table` as statements of `phase` must address it.
    pub fn phase_column(&self, phase: Phase, table: &str, column: &str) -> String {
        match phase {
            Phase::Expand => self
                .renames
                .previous_column_name(&self.schema, table, column),
            Phase::Alter | Phase::Contract => column.to_string(),
        }
    }

    /// [`Self::phase_column`] over a list.
    pub fn phase_columns(&self, phase: Phase, table: &str, columns: &[String]) -> Vec<String> {
        columns
            .iter()
            .map(|c| self.phase_column(phase, table, c))
            .collect()
    }

    /// Whether the primary key generator takes care of a nullability change.
    ///
    /// Columns joining a new primary key of an existing table become
    /// `NOT NULL` through the key itself. Columns leaving the key become
    /// nullable when the old key is dropped.
    pub fn primary_key_owns_nullability(&self, table: &str, column: &str, to_nullable: bool) -> bool {
        if self.is_added_table(table) || self.is_dropped_table(table) {
            return false;
        }
        let desired = self.desired.primary_key_of(table);
        let actual = self.actual.primary_key_of(table);
        let in_desired = desired.is_some_and(|pk| pk.columns.iter().any(|c| c == column));
        let in_actual = actual.is_some_and(|pk| pk.columns.iter().any(|c| c == column));
        let key_changes = match (desired, actual) {
            (Some(d), Some(a)) => {
                let mut dc = d.columns.clone();
                let mut ac = a.columns.clone();
                dc.sort();
                ac.sort();
                dc != ac
            }
            (None, None) => false,
            _ => true,
        };
        if !key_changes {
            return false;
        }
        if to_nullable {
            in_actual && !in_desired
        } else {
            in_desired
        }
    }
}
