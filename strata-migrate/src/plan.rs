//! Changeset ordering and migration planning.
//!
//! [`Planner::plan`] runs the whole pipeline: normalize both snapshots,
//! resolve renames, align the actual snapshot, diff, generate changesets and
//! order them into the expand, alter and contract phases.

use strata_schema::SchemaSnapshot;
use tracing::{debug, info};

use crate::align::align;
use crate::changeset::{Changeset, Phase, Warning, WarningKind};
use crate::config::MigrateConfig;
use crate::context::GeneratorContext;
use crate::diff::{DiffKind, Difference, diff};
use crate::error::{MigrateResult, MigrationError};
use crate::generators::generate_all;
use crate::intents::IntentStore;
use crate::program::MigrationProgram;
use crate::rename::{RenameIntent, RenameResolver, ResolvedRenames};

/// Changesets split by phase, each phase sorted by priority.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpandAlterContract {
    /// Additive changes.
    pub expand: Vec<Changeset>,
    /// In-place changes.
    pub alter: Vec<Changeset>,
    /// Destructive changes.
    pub contract: Vec<Changeset>,
}

impl ExpandAlterContract {
    /// Changesets of one phase.
    pub fn phase(&self, phase: Phase) -> &[Changeset] {
        match phase {
            Phase::Expand => &self.expand,
            Phase::Alter => &self.alter,
            Phase::Contract => &self.contract,
        }
    }

    /// All changesets in execution order.
    pub fn iter(&self) -> impl Iterator<Item = &Changeset> {
        self.expand
            .iter()
            .chain(self.alter.iter())
            .chain(self.contract.iter())
    }

    /// Total number of changesets.
    pub fn len(&self) -> usize {
        self.expand.len() + self.alter.len() + self.contract.len()
    }

    /// Check if there is nothing to do.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every warning, in execution order.
    pub fn warnings(&self) -> Vec<&Warning> {
        self.iter().flat_map(|c| c.warnings.iter()).collect()
    }
}

/// Order changesets by `(phase, priority)`.
///
/// The sort is stable: changesets with equal keys keep their input order.
pub fn order(mut changesets: Vec<Changeset>) -> ExpandAlterContract {
    changesets.sort_by_key(|c| (c.phase, c.priority));

    let mut ordered = ExpandAlterContract::default();
    for changeset in changesets {
        match changeset.phase {
            Phase::Expand => ordered.expand.push(changeset),
            Phase::Alter => ordered.alter.push(changeset),
            Phase::Contract => ordered.contract.push(changeset),
        }
    }
    ordered
}

/// Result of planning.
#[derive(Debug, Clone)]
pub struct MigrationPlan {
    /// Renames that were applied.
    pub renames: ResolvedRenames,
    /// Differences between desired and aligned actual.
    pub differences: Vec<Difference>,
    /// Ordered changesets.
    pub changesets: ExpandAlterContract,
}

impl MigrationPlan {
    /// Check if the database already matches.
    pub fn is_empty(&self) -> bool {
        self.changesets.is_empty()
    }

    /// Get a summary of the plan.
    pub fn summary(&self) -> String {
        if self.is_empty() {
            return "No changes to apply".to_string();
        }
        let mut parts: Vec<String> = Phase::ALL
            .iter()
            .map(|p| format!("{} {}", self.changesets.phase(*p).len(), p))
            .collect();
        let warnings = self.changesets.warnings().len();
        if warnings > 0 {
            parts.push(format!("{} warnings", warnings));
        }
        parts.join(", ")
    }

    /// Executable program for this plan.
    pub fn program(&self) -> MigrationProgram {
        MigrationProgram::new(self.changesets.clone())
    }
}

/// Plans migrations from a desired and an actual snapshot.
#[derive(Debug, Clone, Default)]
pub struct Planner {
    config: MigrateConfig,
}

impl Planner {
    /// Create a planner.
    pub fn new(config: MigrateConfig) -> Self {
        Self { config }
    }

    /// Get the configuration.
    pub fn config(&self) -> &MigrateConfig {
        &self.config
    }

    /// Plan with the rename intents recorded under the configured directory.
    pub async fn plan_with_intents(
        &self,
        desired: &SchemaSnapshot,
        actual: &SchemaSnapshot,
    ) -> MigrateResult<MigrationPlan> {
        let intents = IntentStore::new(&self.config.renames_dir).load().await?;
        self.plan(desired, actual, &intents)
    }

    /// Plan the changes that turn `actual` into `desired`.
    ///
    /// Fails with [`MigrationError::DataLoss`] when a changeset would drop
    /// data and the configuration does not allow it.
    pub fn plan(
        &self,
        desired: &SchemaSnapshot,
        actual: &SchemaSnapshot,
        intents: &[RenameIntent],
    ) -> MigrateResult<MigrationPlan> {
        self.config.validate()?;
        let policy = self.config.naming_policy();
        let schema = self.config.schema.as_str();

        let desired = desired.clone().normalized(policy);
        let actual = actual.clone().normalized_actual();
        desired.validate()?;
        actual.validate()?;

        let intents: Vec<RenameIntent> = intents.iter().map(|i| i.with_policy(policy)).collect();
        let renames = RenameResolver::new(&desired, &actual).resolve(&intents)?;
        let aligned = align(&actual, &renames, schema);

        let mut differences = diff(&desired, &aligned);
        differences.sort_by_key(|d| table_order(d, &desired, &aligned));
        debug!(count = differences.len(), "Computed differences");

        let ctx = GeneratorContext::new(schema, &desired, &aligned, &renames)
            .with_policy(policy)
            .with_concurrent_indexes(self.config.concurrent_indexes);
        let changesets = generate_all(&differences, &ctx)?;

        if !self.config.allow_data_loss {
            let losses: Vec<&str> = changesets
                .iter()
                .flat_map(|c| c.warnings.iter())
                .filter(|w| w.kind == WarningKind::DataLoss)
                .map(|w| w.message.as_str())
                .collect();
            if !losses.is_empty() {
                return Err(MigrationError::data_loss(format!(
                    "{}. Set allow_data_loss = true to proceed.",
                    losses.join("; ")
                )));
            }
        }

        let changesets = order(changesets);
        info!(
            expand = changesets.expand.len(),
            alter = changesets.alter.len(),
            contract = changesets.contract.len(),
            "Planned migration"
        );

        Ok(MigrationPlan {
            renames,
            differences,
            changesets,
        })
    }
}

/// Dependency position of the table a difference belongs to. Creates follow
/// the desired order, removals the reverse of the actual order.
fn table_order(difference: &Difference, desired: &SchemaSnapshot, actual: &SchemaSnapshot) -> usize {
    match (difference.table(), difference.kind()) {
        (Some(table), DiffKind::Remove) => actual
            .table_priorities
            .len()
            .saturating_sub(actual.table_rank(table)),
        (Some(table), _) => desired.table_rank(table),
        (None, _) => 0,
    }
}
