//! Phased execution of migration units.
//!
//! Units form a single dependency chain. The migrator walks the chain,
//! splits it into groups of consecutive units with the same transaction
//! flag and runs each transactional group inside one transaction. A
//! non-transactional group runs its units one by one with no transaction.
//!
//! The first failure stops the run. Groups that already finished stay
//! applied, units of the failing transactional group are rolled back, and
//! everything after the failure is reported as not executed.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::{DatabaseError, MigrateResult, MigrationError};

/// Database handle the migrator owns for the duration of a run.
#[async_trait]
pub trait MigrationConnection: Send {
    /// Execute one statement.
    async fn execute(&mut self, sql: &str) -> Result<(), DatabaseError>;

    /// Open a transaction.
    async fn begin(&mut self) -> Result<(), DatabaseError> {
        self.execute("BEGIN").await
    }

    /// Commit the open transaction.
    async fn commit(&mut self) -> Result<(), DatabaseError> {
        self.execute("COMMIT").await
    }

    /// Roll back the open transaction.
    async fn rollback(&mut self) -> Result<(), DatabaseError> {
        self.execute("ROLLBACK").await
    }
}

/// One executable migration step.
#[async_trait]
pub trait MigrationUnit: Send + Sync {
    /// Unique name of the unit.
    fn name(&self) -> &str;

    /// Name of the unit this one follows, `None` for the first unit.
    fn depends_on(&self) -> Option<&str>;

    /// Whether the unit may run inside a transaction.
    fn transaction(&self) -> bool {
        true
    }

    /// Whether the unit is an unfilled placeholder.
    fn scaffold(&self) -> bool {
        false
    }

    /// Apply the unit.
    async fn up(&self, conn: &mut dyn MigrationConnection) -> Result<(), DatabaseError>;

    /// Revert the unit.
    async fn down(&self, conn: &mut dyn MigrationConnection) -> Result<(), DatabaseError>;
}

/// Direction a unit ran in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Applying.
    Up,
    /// Reverting.
    Down,
}

/// Outcome of one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitStatus {
    /// The unit ran and its transaction, if any, committed.
    Success,
    /// The unit or its group's commit failed.
    Error,
    /// Never ran, or rolled back with its group.
    NotExecuted,
}

/// Outcome of one unit in a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitResult {
    /// Unit name.
    pub migration_name: String,
    /// Direction.
    pub direction: Direction,
    /// Status.
    pub status: UnitStatus,
}

/// Outcome of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Every unit of the run, in execution order.
    pub results: Vec<UnitResult>,
    /// The database error that stopped the run.
    pub error: Option<DatabaseError>,
}

impl ExecutionResult {
    /// Check if every unit ran.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Names of units with `status`.
    pub fn with_status(&self, status: UnitStatus) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| r.status == status)
            .map(|r| r.migration_name.as_str())
            .collect()
    }
}

/// Consecutive units sharing a transaction flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitGroup {
    /// Whether the group runs in one transaction.
    pub transaction: bool,
    /// Unit names in execution order.
    pub names: Vec<String>,
}

/// Where a rollback stops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationTarget {
    /// Stop once this unit is the latest applied one.
    Name(String),
    /// Revert every applied unit.
    NoMigrations,
}

/// Runs a chain of migration units against one connection.
pub struct PhasedMigrator {
    units: Vec<Box<dyn MigrationUnit>>,
    applied: usize,
}

impl std::fmt::Debug for PhasedMigrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhasedMigrator")
            .field("units", &self.units.iter().map(|u| u.name()).collect::<Vec<_>>())
            .field("applied", &self.applied)
            .finish()
    }
}

impl PhasedMigrator {
    /// Create a migrator, ordering `units` along their dependency chain.
    ///
    /// Fails unless the units form exactly one chain: one root, unique
    /// names and no unit with two dependents.
    pub fn new(units: Vec<Box<dyn MigrationUnit>>) -> MigrateResult<Self> {
        let units = chain(units)?;
        Ok(Self { units, applied: 0 })
    }

    /// Mark the chain as applied up to and including `name`.
    pub fn with_applied(mut self, name: &str) -> MigrateResult<Self> {
        self.applied = self.position(name)? + 1;
        Ok(self)
    }

    /// Unit names in chain order.
    pub fn names(&self) -> Vec<&str> {
        self.units.iter().map(|u| u.name()).collect()
    }

    /// Names of applied units.
    pub fn applied(&self) -> Vec<&str> {
        self.units[..self.applied].iter().map(|u| u.name()).collect()
    }

    /// Groups that `migrate_to_latest` would run.
    pub fn forward_plan(&self) -> Vec<UnitGroup> {
        group(self.units[self.applied..].iter().map(|u| u.as_ref()))
    }

    /// Groups that `migrate_down_to` would revert, latest first.
    ///
    /// The target itself stays applied.
    pub fn migration_plan(&self, target: &MigrationTarget) -> MigrateResult<Vec<UnitGroup>> {
        let stop = self.stop_index(target)?;
        Ok(group(self.units[stop..self.applied].iter().rev().map(|u| u.as_ref())))
    }

    /// Apply every pending unit.
    pub async fn migrate_to_latest(
        &mut self,
        conn: &mut dyn MigrationConnection,
    ) -> ExecutionResult {
        let groups = self.forward_plan();
        info!(
            pending = self.units.len() - self.applied,
            groups = groups.len(),
            "Migrating to latest"
        );
        let result = self.run(conn, &groups, Direction::Up).await;
        self.applied += result.with_status(UnitStatus::Success).len();
        result
    }

    /// Revert applied units down to `target`.
    pub async fn migrate_down_to(
        &mut self,
        conn: &mut dyn MigrationConnection,
        target: &MigrationTarget,
    ) -> MigrateResult<ExecutionResult> {
        let groups = self.migration_plan(target)?;
        info!(to = ?target, groups = groups.len(), "Rolling back");
        let result = self.run(conn, &groups, Direction::Down).await;
        self.applied -= result.with_status(UnitStatus::Success).len();
        Ok(result)
    }

    fn position(&self, name: &str) -> MigrateResult<usize> {
        self.units
            .iter()
            .position(|u| u.name() == name)
            .ok_or_else(|| MigrationError::NotFound(name.to_string()))
    }

    fn stop_index(&self, target: &MigrationTarget) -> MigrateResult<usize> {
        match target {
            MigrationTarget::NoMigrations => Ok(0),
            MigrationTarget::Name(name) => {
                let index = self.position(name)? + 1;
                Ok(index.min(self.applied))
            }
        }
    }

    fn unit(&self, name: &str) -> Option<&dyn MigrationUnit> {
        self.units
            .iter()
            .find(|u| u.name() == name)
            .map(|u| u.as_ref())
    }

    async fn run(
        &self,
        conn: &mut dyn MigrationConnection,
        groups: &[UnitGroup],
        direction: Direction,
    ) -> ExecutionResult {
        let mut result = ExecutionResult::default();

        for group in groups {
            if result.error.is_some() {
                skip(&mut result, &group.names, direction);
                continue;
            }
            debug!(
                transaction = group.transaction,
                units = group.names.len(),
                "Running group"
            );
            if group.transaction {
                self.run_transactional(conn, group, direction, &mut result).await;
            } else {
                for (i, name) in group.names.iter().enumerate() {
                    if let Err(err) = self.run_unit(conn, name, direction).await {
                        push(&mut result, name, direction, UnitStatus::Error);
                        skip(&mut result, &group.names[i + 1..], direction);
                        result.error = Some(err);
                        break;
                    }
                    push(&mut result, name, direction, UnitStatus::Success);
                }
            }
        }

        if let Some(err) = &result.error {
            error!(error = %err, code = ?err.code, "Migration run failed");
        } else {
            info!(units = result.results.len(), "Migration run finished");
        }
        result
    }

    async fn run_transactional(
        &self,
        conn: &mut dyn MigrationConnection,
        group: &UnitGroup,
        direction: Direction,
        result: &mut ExecutionResult,
    ) {
        if let Err(err) = conn.begin().await {
            skip(result, &group.names, direction);
            result.error = Some(err);
            return;
        }

        for (i, name) in group.names.iter().enumerate() {
            if let Err(err) = self.run_unit(conn, name, direction).await {
                if let Err(rollback) = conn.rollback().await {
                    warn!(error = %rollback, "Rollback failed");
                }
                skip(result, &group.names[..i], direction);
                push(result, name, direction, UnitStatus::Error);
                skip(result, &group.names[i + 1..], direction);
                result.error = Some(err);
                return;
            }
        }

        match conn.commit().await {
            Ok(()) => {
                for name in &group.names {
                    push(result, name, direction, UnitStatus::Success);
                }
            }
            Err(err) => {
                if let Some((last, rest)) = group.names.split_last() {
                    skip(result, rest, direction);
                    push(result, last, direction, UnitStatus::Error);
                }
                result.error = Some(err);
            }
        }
    }

    async fn run_unit(
        &self,
        conn: &mut dyn MigrationConnection,
        name: &str,
        direction: Direction,
    ) -> Result<(), DatabaseError> {
        let unit = self
            .unit(name)
            .ok_or_else(|| DatabaseError::message(format!("unknown migration unit `{}`", name)))?;
        if unit.scaffold() {
            debug!(unit = name, "Running scaffold unit");
        }
        debug!(unit = name, direction = ?direction, "Running unit");
        match direction {
            Direction::Up => unit.up(conn).await,
            Direction::Down => unit.down(conn).await,
        }
    }
}

fn push(result: &mut ExecutionResult, name: &str, direction: Direction, status: UnitStatus) {
    result.results.push(UnitResult {
        migration_name: name.to_string(),
        direction,
        status,
    });
}

fn skip(result: &mut ExecutionResult, names: &[String], direction: Direction) {
    for name in names {
        push(result, name, direction, UnitStatus::NotExecuted);
    }
}

/// Split units into maximal runs with the same transaction flag.
fn group<'a>(units: impl Iterator<Item = &'a dyn MigrationUnit>) -> Vec<UnitGroup> {
    let mut groups: Vec<UnitGroup> = Vec::new();
    for unit in units {
        match groups.last_mut() {
            Some(group) if group.transaction == unit.transaction() => {
                group.names.push(unit.name().to_string())
            }
            _ => groups.push(UnitGroup {
                transaction: unit.transaction(),
                names: vec![unit.name().to_string()],
            }),
        }
    }
    groups
}

/// Order units along their dependency chain.
fn chain(units: Vec<Box<dyn MigrationUnit>>) -> MigrateResult<Vec<Box<dyn MigrationUnit>>> {
    let mut names = HashSet::new();
    for unit in &units {
        if !names.insert(unit.name().to_string()) {
            return Err(MigrationError::dependency_chain(format!(
                "duplicate unit `{}`",
                unit.name()
            )));
        }
    }

    let mut root = None;
    let mut next: HashMap<String, usize> = HashMap::new();
    for (i, unit) in units.iter().enumerate() {
        match unit.depends_on() {
            None => {
                if let Some(other) = root.replace(i) {
                    return Err(MigrationError::dependency_chain(format!(
                        "both `{}` and `{}` have no dependency",
                        units[other].name(),
                        unit.name()
                    )));
                }
            }
            Some(parent) => {
                if !names.contains(parent) {
                    return Err(MigrationError::dependency_chain(format!(
                        "`{}` depends on unknown unit `{}`",
                        unit.name(),
                        parent
                    )));
                }
                if next.insert(parent.to_string(), i).is_some() {
                    return Err(MigrationError::dependency_chain(format!(
                        "more than one unit depends on `{}`",
                        parent
                    )));
                }
            }
        }
    }

    let mut order = Vec::with_capacity(units.len());
    let mut current = root;
    while let Some(i) = current {
        order.push(i);
        current = next.get(units[i].name()).copied();
    }
    if order.len() != units.len() {
        return Err(MigrationError::dependency_chain(
            "not every unit is reachable from the first one",
        ));
    }

    let mut slots: Vec<Option<Box<dyn MigrationUnit>>> = units.into_iter().map(Some).collect();
    Ok(order.into_iter().filter_map(|i| slots[i].take()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, Mutex};

    /// Connection that records statements and fails on demand.
    #[derive(Default, Clone)]
    struct Recorder {
        log: Arc<Mutex<Vec<String>>>,
        fail_on: Option<String>,
    }

    impl Recorder {
        fn failing_on(sql: &str) -> Self {
            Self {
                fail_on: Some(sql.to_string()),
                ..Self::default()
            }
        }

        fn log(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MigrationConnection for Recorder {
        async fn execute(&mut self, sql: &str) -> Result<(), DatabaseError> {
            self.log.lock().unwrap().push(sql.to_string());
            if self.fail_on.as_deref() == Some(sql) {
                return Err(DatabaseError::new("42P01", format!("failed: {}", sql)));
            }
            Ok(())
        }
    }

    struct Unit {
        name: String,
        depends_on: Option<String>,
        transaction: bool,
    }

    #[async_trait]
    impl MigrationUnit for Unit {
        fn name(&self) -> &str {
            &self.name
        }

        fn depends_on(&self) -> Option<&str> {
            self.depends_on.as_deref()
        }

        fn transaction(&self) -> bool {
            self.transaction
        }

        async fn up(&self, conn: &mut dyn MigrationConnection) -> Result<(), DatabaseError> {
            conn.execute(&format!("up {}", self.name)).await
        }

        async fn down(&self, conn: &mut dyn MigrationConnection) -> Result<(), DatabaseError> {
            conn.execute(&format!("down {}", self.name)).await
        }
    }

    fn units(flags: &[bool]) -> Vec<Box<dyn MigrationUnit>> {
        flags
            .iter()
            .enumerate()
            .map(|(i, transaction)| {
                Box::new(Unit {
                    name: format!("m{}", i + 1),
                    depends_on: (i > 0).then(|| format!("m{}", i)),
                    transaction: *transaction,
                }) as Box<dyn MigrationUnit>
            })
            .collect()
    }

    fn sizes(groups: &[UnitGroup]) -> Vec<(usize, bool)> {
        groups.iter().map(|g| (g.names.len(), g.transaction)).collect()
    }

    #[test]
    fn test_grouping_by_transaction_flag() {
        let migrator = PhasedMigrator::new(units(&[true, true, false, false, true])).unwrap();
        assert_eq!(
            sizes(&migrator.forward_plan()),
            vec![(2, true), (2, false), (1, true)]
        );
    }

    #[test]
    fn test_chain_order_beats_list_order() {
        let mut list = units(&[true, true, true]);
        list.reverse();
        let migrator = PhasedMigrator::new(list).unwrap();
        assert_eq!(migrator.names(), vec!["m1", "m2", "m3"]);
    }

    #[test]
    fn test_invalid_chains() {
        let mut branched = units(&[true, true]);
        branched.push(Box::new(Unit {
            name: "m3".to_string(),
            depends_on: Some("m1".to_string()),
            transaction: true,
        }));
        assert!(matches!(
            PhasedMigrator::new(branched),
            Err(MigrationError::DependencyChain(_))
        ));

        let mut two_roots = units(&[true]);
        two_roots.push(Box::new(Unit {
            name: "other".to_string(),
            depends_on: None,
            transaction: true,
        }));
        assert!(PhasedMigrator::new(two_roots).is_err());

        let mut duplicate = units(&[true]);
        duplicate.extend(units(&[true]));
        assert!(PhasedMigrator::new(duplicate).is_err());

        let dangling: Vec<Box<dyn MigrationUnit>> = vec![Box::new(Unit {
            name: "m2".to_string(),
            depends_on: Some("m1".to_string()),
            transaction: true,
        })];
        assert!(PhasedMigrator::new(dangling).is_err());
    }

    #[tokio::test]
    async fn test_migrate_to_latest_runs_groups() {
        let mut migrator = PhasedMigrator::new(units(&[true, true, false, false, true])).unwrap();
        let mut conn = Recorder::default();

        let result = migrator.migrate_to_latest(&mut conn).await;
        assert!(result.is_success());
        assert_eq!(result.with_status(UnitStatus::Success).len(), 5);
        assert_eq!(
            conn.log(),
            vec![
                "BEGIN", "up m1", "up m2", "COMMIT", "up m3", "up m4", "BEGIN", "up m5", "COMMIT",
            ]
        );
        assert_eq!(migrator.applied().len(), 5);
        assert!(migrator.forward_plan().is_empty());
    }

    #[tokio::test]
    async fn test_failure_in_transactional_group() {
        let mut migrator = PhasedMigrator::new(units(&[false, true, true, true])).unwrap();
        let mut conn = Recorder::failing_on("up m3");

        let result = migrator.migrate_to_latest(&mut conn).await;
        assert_eq!(
            result.error,
            Some(DatabaseError::new("42P01", "failed: up m3"))
        );
        assert_eq!(result.with_status(UnitStatus::Success), vec!["m1"]);
        assert_eq!(result.with_status(UnitStatus::Error), vec!["m3"]);
        assert_eq!(result.with_status(UnitStatus::NotExecuted), vec!["m2", "m4"]);
        assert_eq!(
            conn.log(),
            vec!["up m1", "BEGIN", "up m2", "up m3", "ROLLBACK"]
        );
        assert_eq!(migrator.applied(), vec!["m1"]);
    }

    #[tokio::test]
    async fn test_failure_in_non_transactional_group_keeps_earlier_units() {
        let mut migrator = PhasedMigrator::new(units(&[false, false, false, true])).unwrap();
        let mut conn = Recorder::failing_on("up m2");

        let result = migrator.migrate_to_latest(&mut conn).await;
        assert!(!result.is_success());
        assert_eq!(result.with_status(UnitStatus::Success), vec!["m1"]);
        assert_eq!(result.with_status(UnitStatus::Error), vec!["m2"]);
        assert_eq!(result.with_status(UnitStatus::NotExecuted), vec!["m3", "m4"]);
        assert_eq!(conn.log(), vec!["up m1", "up m2"]);
    }

    #[tokio::test]
    async fn test_commit_failure_marks_last_unit() {
        let mut migrator = PhasedMigrator::new(units(&[true, true])).unwrap();
        let mut conn = Recorder::failing_on("COMMIT");

        let result = migrator.migrate_to_latest(&mut conn).await;
        assert_eq!(result.with_status(UnitStatus::NotExecuted), vec!["m1"]);
        assert_eq!(result.with_status(UnitStatus::Error), vec!["m2"]);
        assert!(migrator.applied().is_empty());
    }

    #[test]
    fn test_rollback_plan_excludes_target() {
        let migrator = PhasedMigrator::new(units(&[true, false, false, true, true]))
            .unwrap()
            .with_applied("m5")
            .unwrap();

        let plan = migrator
            .migration_plan(&MigrationTarget::Name("m2".to_string()))
            .unwrap();
        assert_eq!(
            plan,
            vec![
                UnitGroup {
                    transaction: true,
                    names: vec!["m5".to_string(), "m4".to_string()],
                },
                UnitGroup {
                    transaction: false,
                    names: vec!["m3".to_string()],
                },
            ]
        );

        let all = migrator.migration_plan(&MigrationTarget::NoMigrations).unwrap();
        assert_eq!(sizes(&all), vec![(2, true), (2, false), (1, true)]);
    }

    #[test]
    fn test_unknown_target() {
        let migrator = PhasedMigrator::new(units(&[true])).unwrap();
        assert!(matches!(
            migrator.migration_plan(&MigrationTarget::Name("missing".to_string())),
            Err(MigrationError::NotFound(_))
        ));
        assert!(PhasedMigrator::new(units(&[true])).unwrap().with_applied("nope").is_err());
    }

    #[tokio::test]
    async fn test_migrate_down_to() {
        let mut migrator = PhasedMigrator::new(units(&[true, true, false]))
            .unwrap()
            .with_applied("m3")
            .unwrap();
        let mut conn = Recorder::default();

        let result = migrator
            .migrate_down_to(&mut conn, &MigrationTarget::Name("m1".to_string()))
            .await
            .unwrap();
        assert!(result.is_success());
        assert!(result.results.iter().all(|r| r.direction == Direction::Down));
        assert_eq!(conn.log(), vec!["down m3", "BEGIN", "down m2", "COMMIT"]);
        assert_eq!(migrator.applied(), vec!["m1"]);
    }
}
