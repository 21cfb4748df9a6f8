//! Migration programs: ordered changesets ready to render or execute.

use std::fmt::Write as _;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::changeset::{Changeset, Operation, Phase};
use crate::error::DatabaseError;
use crate::execute::run_operations;
use crate::migrator::{MigrationConnection, MigrationUnit};
use crate::plan::ExpandAlterContract;

/// A planned migration as statement lists per phase.
///
/// Up runs expand, alter, contract with changesets in priority order. Down
/// runs the phases backwards and each phase's changesets in reverse.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationProgram {
    changesets: ExpandAlterContract,
}

impl MigrationProgram {
    /// Program over ordered changesets.
    pub fn new(changesets: ExpandAlterContract) -> Self {
        Self { changesets }
    }

    /// Ordered changesets.
    pub fn changesets(&self) -> &ExpandAlterContract {
        &self.changesets
    }

    /// Check if the program does nothing.
    pub fn is_empty(&self) -> bool {
        self.changesets.iter().all(|c| c.up.is_empty() && c.down.is_empty())
    }

    /// Forward operations of one phase.
    pub fn up(&self, phase: Phase) -> Vec<&Operation> {
        self.changesets
            .phase(phase)
            .iter()
            .flat_map(|c| c.up.iter())
            .collect()
    }

    /// Reverse operations of one phase, in the order they must run.
    pub fn down(&self, phase: Phase) -> Vec<&Operation> {
        self.changesets
            .phase(phase)
            .iter()
            .rev()
            .flat_map(|c| c.down.iter())
            .collect()
    }

    /// SQL script of the forward program.
    pub fn render_up(&self) -> String {
        render(Phase::ALL.iter().map(|p| (*p, self.up(*p))))
    }

    /// SQL script of the reverse program.
    pub fn render_down(&self) -> String {
        render(Phase::ALL.iter().rev().map(|p| (*p, self.down(*p))))
    }

    /// Split the program into a chain of executable units.
    ///
    /// Each phase yields one unit per maximal run of changesets that agree on
    /// running inside a transaction. Units are named
    /// `{prefix}_{position}_{phase}` and depend on their predecessor.
    pub fn into_units(self, prefix: &str) -> Vec<OperationUnit> {
        let mut units: Vec<OperationUnit> = Vec::new();

        for phase in Phase::ALL {
            let mut runs: Vec<(bool, Vec<&Changeset>)> = Vec::new();
            for changeset in self.changesets.phase(phase) {
                if changeset.up.is_empty() && changeset.down.is_empty() {
                    continue;
                }
                match runs.last_mut() {
                    Some((transaction, run)) if *transaction == changeset.transaction => {
                        run.push(changeset)
                    }
                    _ => runs.push((changeset.transaction, vec![changeset])),
                }
            }

            for (transaction, run) in runs {
                let name = format!("{}_{:02}_{}", prefix, units.len() + 1, phase);
                let depends_on = units.last().map(|u| u.name.clone());
                units.push(OperationUnit {
                    name,
                    depends_on,
                    transaction,
                    up: run.iter().flat_map(|c| c.up.iter().cloned()).collect(),
                    down: run
                        .iter()
                        .rev()
                        .flat_map(|c| c.down.iter().cloned())
                        .collect(),
                });
            }
        }
        units
    }
}

fn render<'a>(phases: impl Iterator<Item = (Phase, Vec<&'a Operation>)>) -> String {
    let mut out = String::new();
    for (phase, operations) in phases {
        if operations.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
        }
        let _ = writeln!(out, "-- {}", phase);
        for operation in operations {
            let _ = writeln!(out, "{};", operation);
        }
    }
    out
}

/// A migration unit made of plain operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationUnit {
    /// Unit name.
    pub name: String,
    /// Name of the unit this one follows.
    pub depends_on: Option<String>,
    /// Whether the unit runs inside a transaction.
    pub transaction: bool,
    /// Forward operations.
    pub up: Vec<Operation>,
    /// Reverse operations.
    pub down: Vec<Operation>,
}

#[async_trait]
impl MigrationUnit for OperationUnit {
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
        run_operations(conn, &self.up).await
    }

    async fn down(&self, conn: &mut dyn MigrationConnection) -> Result<(), DatabaseError> {
        run_operations(conn, &self.down).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changeset::{ChangesetKind, priority};
    use crate::plan::order;
    use pretty_assertions::assert_eq;

    fn program() -> MigrationProgram {
        let changesets = vec![
            Changeset::new(ChangesetKind::CreateTable, Phase::Expand, priority::CREATE_TABLE, "public")
                .up("CREATE TABLE \"public\".\"tags\" (\"id\" serial NOT NULL)")
                .down("DROP TABLE \"public\".\"tags\""),
            Changeset::new(ChangesetKind::CreateIndex, Phase::Expand, priority::CREATE_INDEX, "public")
                .non_transactional()
                .up("CREATE INDEX CONCURRENTLY \"posts_title_idx\" ON \"public\".\"posts\" (\"title\")")
                .down("DROP INDEX CONCURRENTLY IF EXISTS \"public\".\"posts_title_idx\""),
            Changeset::new(ChangesetKind::RenameColumn, Phase::Alter, priority::RENAME_COLUMN, "public")
                .up("ALTER TABLE \"public\".\"posts\" RENAME COLUMN \"name\" TO \"title\"")
                .down("ALTER TABLE \"public\".\"posts\" RENAME COLUMN \"title\" TO \"name\""),
            Changeset::new(ChangesetKind::DropColumn, Phase::Contract, priority::DROP_COLUMN, "public")
                .up("ALTER TABLE \"public\".\"posts\" DROP COLUMN \"legacy\"")
                .down("ALTER TABLE \"public\".\"posts\" ADD COLUMN \"legacy\" text"),
        ];
        MigrationProgram::new(order(changesets))
    }

    #[test]
    fn test_render_up() {
        assert_eq!(
            program().render_up(),
            "-- expand\n\
             CREATE TABLE \"public\".\"tags\" (\"id\" serial NOT NULL);\n\
             CREATE INDEX CONCURRENTLY \"posts_title_idx\" ON \"public\".\"posts\" (\"title\");\n\
             \n\
             -- alter\n\
             ALTER TABLE \"public\".\"posts\" RENAME COLUMN \"name\" TO \"title\";\n\
             \n\
             -- contract\n\
             ALTER TABLE \"public\".\"posts\" DROP COLUMN \"legacy\";\n"
        );
    }

    #[test]
    fn test_down_reverses_phases_and_changesets() {
        let program = program();
        let down = program.render_down();
        let contract = down.find("-- contract").unwrap();
        let alter = down.find("-- alter").unwrap();
        let expand = down.find("-- expand").unwrap();
        assert!(contract < alter && alter < expand);

        let expand_down: Vec<String> = program
            .down(Phase::Expand)
            .iter()
            .map(|op| op.to_string())
            .collect();
        assert_eq!(
            expand_down,
            vec![
                "DROP INDEX CONCURRENTLY IF EXISTS \"public\".\"posts_title_idx\"",
                "DROP TABLE \"public\".\"tags\"",
            ]
        );
    }

    #[test]
    fn test_units_split_on_transactionality() {
        let units = program().into_units("20260101");
        let shape: Vec<(&str, bool, Option<&str>)> = units
            .iter()
            .map(|u| (u.name.as_str(), u.transaction, u.depends_on.as_deref()))
            .collect();
        assert_eq!(
            shape,
            vec![
                ("20260101_01_expand", true, None),
                ("20260101_02_expand", false, Some("20260101_01_expand")),
                ("20260101_03_alter", true, Some("20260101_02_expand")),
                ("20260101_04_contract", true, Some("20260101_03_alter")),
            ]
        );
    }

    #[test]
    fn test_empty_program() {
        let program = MigrationProgram::default();
        assert!(program.is_empty());
        assert_eq!(program.render_up(), "");
        assert!(program.into_units("x").is_empty());
    }
}
