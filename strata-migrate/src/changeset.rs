//! Changesets: reversible units of DDL work.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Migration phase. Phases run in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Phase {
    /// Additive, non-breaking changes.
    Expand,
    /// In-place changes.
    Alter,
    /// Destructive changes.
    Contract,
}

impl Phase {
    /// All phases in execution order.
    pub const ALL: [Phase; 3] = [Phase::Expand, Phase::Alter, Phase::Contract];

    /// Lowercase label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Expand => "expand",
            Self::Alter => "alter",
            Self::Contract => "contract",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a changeset does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangesetKind {
    CreateSchema,
    DropSchema,
    CreateExtension,
    DropExtension,
    CreateEnum,
    ChangeEnum,
    DropEnum,
    CreateTable,
    DropTable,
    RenameTable,
    CreateColumn,
    DropColumn,
    RenameColumn,
    ChangeColumnType,
    ChangeColumnDefault,
    ChangeColumnNullability,
    ChangeColumnIdentity,
    CreateIndex,
    DropIndex,
    RenameIndex,
    CreatePrimaryKey,
    DropPrimaryKey,
    CreateForeignKey,
    DropForeignKey,
    CreateUniqueIndex,
    CreateUniqueConstraint,
    DropUniqueConstraint,
    CreateCheckConstraint,
    DropCheckConstraint,
    RenameConstraint,
    CreateTrigger,
    DropTrigger,
}

/// Execution priorities, lower runs first within a phase.
pub mod priority {
    // Expand
    pub const CREATE_SCHEMA: u32 = 0;
    pub const CREATE_EXTENSION: u32 = 10;
    pub const CREATE_ENUM: u32 = 20;
    pub const CHANGE_ENUM: u32 = 30;
    pub const CREATE_TABLE: u32 = 100;
    pub const CREATE_COLUMN: u32 = 200;
    pub const CREATE_PRIMARY_KEY: u32 = 300;
    pub const CREATE_INDEX: u32 = 400;
    pub const CREATE_UNIQUE_INDEX: u32 = 410;
    pub const CREATE_UNIQUE_CONSTRAINT: u32 = 420;
    pub const CREATE_CHECK: u32 = 500;
    pub const CREATE_FOREIGN_KEY: u32 = 600;
    pub const CREATE_TRIGGER: u32 = 700;

    // Alter
    pub const RENAME_TABLE: u32 = 50;
    pub const RENAME_COLUMN: u32 = 60;
    pub const RENAME_PRIMARY_KEY: u32 = 70;
    pub const RENAME_INDEX: u32 = 71;
    pub const RENAME_UNIQUE: u32 = 72;
    pub const RENAME_CHECK: u32 = 73;
    pub const RENAME_FOREIGN_KEY: u32 = 74;
    pub const DROP_PRIMARY_KEY: u32 = 150;
    pub const CHANGE_COLUMN_TYPE: u32 = 200;
    pub const CHANGE_COLUMN_DEFAULT: u32 = 210;
    pub const CHANGE_COLUMN_IDENTITY: u32 = 220;
    pub const CHANGE_COLUMN_NULLABILITY: u32 = 240;

    // Contract
    pub const DROP_TRIGGER: u32 = 100;
    pub const DROP_FOREIGN_KEY: u32 = 200;
    pub const DROP_CHECK: u32 = 300;
    pub const DROP_UNIQUE: u32 = 400;
    pub const DROP_INDEX: u32 = 500;
    pub const DROP_COLUMN: u32 = 800;
    pub const DROP_TABLE: u32 = 900;
    /// Objects of a dropped table, restored after the table on rollback.
    pub const DROP_TABLE_OBJECT: u32 = 850;
    pub const DROP_ENUM: u32 = 950;
    pub const DROP_EXTENSION: u32 = 980;
    pub const DROP_SCHEMA: u32 = 990;
}

/// One statement of a changeset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// A plain SQL statement.
    Execute(String),
    /// `CREATE [UNIQUE] INDEX CONCURRENTLY`, cleaned up on unique violation.
    CreateIndexConcurrently {
        /// Schema of the index.
        schema: String,
        /// Table being indexed.
        table: String,
        /// Index name.
        index: String,
        /// The statement.
        sql: String,
    },
}

impl Operation {
    /// Plain statement.
    pub fn sql(sql: impl Into<String>) -> Self {
        Self::Execute(sql.into())
    }

    /// Concurrent index build.
    pub fn create_index_concurrently(
        schema: impl Into<String>,
        table: impl Into<String>,
        index: impl Into<String>,
        sql: impl Into<String>,
    ) -> Self {
        Self::CreateIndexConcurrently {
            schema: schema.into(),
            table: table.into(),
            index: index.into(),
            sql: sql.into(),
        }
    }

    /// SQL text of the operation.
    pub fn statement(&self) -> &str {
        match self {
            Self::Execute(sql) => sql,
            Self::CreateIndexConcurrently { sql, .. } => sql,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.statement())
    }
}

/// Risk category of a changeset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WarningKind {
    /// Data is dropped.
    DataLoss,
    /// Postgres rewrites the whole table.
    TableRewrite,
    /// A full table scan holds a lock.
    FullTableScan,
    /// A `NOT NULL` column is added without a default.
    NotNullWithoutDefault,
    /// The change cannot be reversed.
    Irreversible,
    /// Enum values cannot be removed and stay in place.
    EnumValuesRetained,
}

/// A risk attached to a changeset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    /// Category.
    pub kind: WarningKind,
    /// Human readable description.
    pub message: String,
}

/// One reversible unit of migration work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Changeset {
    /// Order within the phase.
    pub priority: u32,
    /// Phase.
    pub phase: Phase,
    /// Target schema.
    pub schema_name: String,
    /// Table name the statements address.
    pub table_name: Option<String>,
    /// Current (desired) name of the table.
    pub current_table_name: Option<String>,
    /// What the changeset does.
    #[serde(rename = "type")]
    pub kind: ChangesetKind,
    /// Whether the statements may run inside a transaction.
    pub transaction: bool,
    /// Forward statements.
    pub up: Vec<Operation>,
    /// Reverse statements.
    pub down: Vec<Operation>,
    /// Risks.
    pub warnings: Vec<Warning>,
}

impl Changeset {
    /// Create an empty transactional changeset.
    pub fn new(kind: ChangesetKind, phase: Phase, priority: u32, schema: impl Into<String>) -> Self {
        Self {
            priority,
            phase,
            schema_name: schema.into(),
            table_name: None,
            current_table_name: None,
            kind,
            transaction: true,
            up: Vec::new(),
            down: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Set the table names.
    pub fn table(mut self, name: impl Into<String>, current: impl Into<String>) -> Self {
        self.table_name = Some(name.into());
        self.current_table_name = Some(current.into());
        self
    }

    /// Mark the changeset as unable to run in a transaction.
    pub fn non_transactional(mut self) -> Self {
        self.transaction = false;
        self
    }

    /// Append a forward statement.
    pub fn up(mut self, sql: impl Into<String>) -> Self {
        self.up.push(Operation::sql(sql));
        self
    }

    /// Append a forward operation.
    pub fn up_op(mut self, op: Operation) -> Self {
        self.up.push(op);
        self
    }

    /// Append a reverse statement.
    pub fn down(mut self, sql: impl Into<String>) -> Self {
        self.down.push(Operation::sql(sql));
        self
    }

    /// Append a reverse operation.
    pub fn down_op(mut self, op: Operation) -> Self {
        self.down.push(op);
        self
    }

    /// Attach a warning.
    pub fn warn(mut self, kind: WarningKind, message: impl Into<String>) -> Self {
        self.warnings.push(Warning {
            kind,
            message: message.into(),
        });
        self
    }

    /// Whether the changeset carries a warning of `kind`.
    pub fn has_warning(&self, kind: WarningKind) -> bool {
        self.warnings.iter().any(|w| w.kind == kind)
    }

    /// Up statements as SQL text.
    pub fn up_sql(&self) -> Vec<&str> {
        self.up.iter().map(Operation::statement).collect()
    }

    /// Down statements as SQL text.
    pub fn down_sql(&self) -> Vec<&str> {
        self.down.iter().map(Operation::statement).collect()
    }
}
