//! Structural diff between two snapshots.
//!
//! The differ is rename-agnostic: it expects the actual snapshot to be
//! aligned first (see [`crate::align`]). Differences come out as a closed sum
//! type so every dispatch site has to handle every entity kind.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use strata_schema::{
    CheckDefinition, ColumnAttribute, ColumnInfo, Constraint, ConstraintMap,
    ForeignKeyDefinition, IndexDefinition, PrimaryKeyDefinition, SchemaSnapshot, TableInfo,
    TriggerDefinition, UniqueDefinition,
};

/// Create, remove or change of one value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Change<T> {
    /// Present only in the desired snapshot.
    Create(T),
    /// Present only in the actual snapshot.
    Remove(T),
    /// Present in both with different values.
    Update {
        /// Actual value.
        from: T,
        /// Desired value.
        to: T,
    },
}

impl<T> Change<T> {
    /// Kind of the change.
    pub fn kind(&self) -> DiffKind {
        match self {
            Self::Create(_) => DiffKind::Create,
            Self::Remove(_) => DiffKind::Remove,
            Self::Update { .. } => DiffKind::Change,
        }
    }
}

/// Difference type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiffKind {
    /// `CREATE`.
    Create,
    /// `REMOVE`.
    Remove,
    /// `CHANGE`.
    Change,
}

/// Whether a constraint difference stems from a table-wide entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Arity {
    /// The table has no entries at all on the other side.
    Table,
    /// A single entry inside a map both sides have.
    Entry,
}

/// A difference of one keyed constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintDiff<C> {
    /// Owning table, current name.
    pub table: String,
    /// Key of the entry.
    pub key: String,
    /// Whether the whole per-table map appeared or disappeared.
    pub arity: Arity,
    /// The change.
    pub change: Change<C>,
}

/// One structural difference between desired and actual.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Difference {
    /// A non-default schema.
    Schema(Change<String>),
    /// An extension.
    Extension(Change<String>),
    /// An enum type.
    Enum {
        /// Type name.
        name: String,
        /// Values.
        change: Change<Vec<String>>,
    },
    /// A table. `Update` means the live name differs.
    Table {
        /// Current name.
        table: String,
        /// The change.
        change: Change<TableInfo>,
    },
    /// A column added to or removed from an existing table.
    Column {
        /// Owning table, current name.
        table: String,
        /// Column, current name.
        column: String,
        /// The change; never `Update`, see [`Difference::ColumnChange`].
        change: Change<ColumnInfo>,
    },
    /// One attribute of a column changed.
    ColumnChange {
        /// Owning table, current name.
        table: String,
        /// Column, current name.
        column: String,
        /// The attribute that differs.
        attribute: ColumnAttribute,
        /// Actual column.
        from: ColumnInfo,
        /// Desired column.
        to: ColumnInfo,
    },
    /// An index.
    Index(ConstraintDiff<IndexDefinition>),
    /// A primary key.
    PrimaryKey(ConstraintDiff<PrimaryKeyDefinition>),
    /// A foreign key.
    ForeignKey(ConstraintDiff<ForeignKeyDefinition>),
    /// A unique constraint.
    Unique(ConstraintDiff<UniqueDefinition>),
    /// A check constraint.
    Check(ConstraintDiff<CheckDefinition>),
    /// A trigger.
    Trigger(ConstraintDiff<TriggerDefinition>),
}

fn constraint_path<C>(kind: &str, diff: &ConstraintDiff<C>) -> Vec<String> {
    vec![kind.to_string(), diff.table.clone(), diff.key.clone()]
}

impl Difference {
    /// `CREATE`, `REMOVE` or `CHANGE`.
    pub fn kind(&self) -> DiffKind {
        match self {
            Self::Schema(change) | Self::Extension(change) => change.kind(),
            Self::Enum { change, .. } => change.kind(),
            Self::Table { change, .. } => change.kind(),
            Self::Column { change, .. } => change.kind(),
            Self::ColumnChange { .. } => DiffKind::Change,
            Self::Index(d) => d.change.kind(),
            Self::PrimaryKey(d) => d.change.kind(),
            Self::ForeignKey(d) => d.change.kind(),
            Self::Unique(d) => d.change.kind(),
            Self::Check(d) => d.change.kind(),
            Self::Trigger(d) => d.change.kind(),
        }
    }

    /// Address of the difference: entity kind, table, then sub-keys.
    pub fn path(&self) -> Vec<String> {
        match self {
            Self::Schema(change) => vec!["schemaInfo".to_string(), change_label(change)],
            Self::Extension(change) => vec!["extensions".to_string(), change_label(change)],
            Self::Enum { name, .. } => vec!["enums".to_string(), name.clone()],
            Self::Table { table, .. } => vec!["tables".to_string(), table.clone()],
            Self::Column { table, column, .. } => {
                vec!["columns".to_string(), table.clone(), column.clone()]
            }
            Self::ColumnChange {
                table,
                column,
                attribute,
                ..
            } => vec![
                "columns".to_string(),
                table.clone(),
                column.clone(),
                attribute.as_str().to_string(),
            ],
            Self::Index(d) => constraint_path("indexes", d),
            Self::PrimaryKey(d) => constraint_path("primaryKey", d),
            Self::ForeignKey(d) => constraint_path("foreignKeyConstraints", d),
            Self::Unique(d) => constraint_path("uniqueConstraints", d),
            Self::Check(d) => constraint_path("checkConstraints", d),
            Self::Trigger(d) => constraint_path("triggers", d),
        }
    }

    /// Owning table, if the difference belongs to one.
    pub fn table(&self) -> Option<&str> {
        match self {
            Self::Schema(_) | Self::Extension(_) | Self::Enum { .. } => None,
            Self::Table { table, .. }
            | Self::Column { table, .. }
            | Self::ColumnChange { table, .. } => Some(table),
            Self::Index(d) => Some(&d.table),
            Self::PrimaryKey(d) => Some(&d.table),
            Self::ForeignKey(d) => Some(&d.table),
            Self::Unique(d) => Some(&d.table),
            Self::Check(d) => Some(&d.table),
            Self::Trigger(d) => Some(&d.table),
        }
    }
}

fn change_label(change: &Change<String>) -> String {
    match change {
        Change::Create(v) | Change::Remove(v) => v.clone(),
        Change::Update { to, .. } => to.clone(),
    }
}

fn diff_set(desired: &BTreeSet<String>, actual: &BTreeSet<String>) -> Vec<Change<String>> {
    let mut changes: Vec<Change<String>> = desired
        .difference(actual)
        .map(|v| Change::Create(v.clone()))
        .collect();
    changes.extend(actual.difference(desired).map(|v| Change::Remove(v.clone())));
    changes
}

fn diff_constraints<C: Constraint>(
    desired: &ConstraintMap<C>,
    actual: &ConstraintMap<C>,
    wrap: impl Fn(ConstraintDiff<C>) -> Difference,
    out: &mut Vec<Difference>,
) {
    let empty = BTreeMap::new();
    let tables: BTreeSet<&String> = desired.keys().chain(actual.keys()).collect();

    for table in tables {
        let want = desired.get(table).unwrap_or(&empty);
        let have = actual.get(table).unwrap_or(&empty);
        let create_arity = if have.is_empty() {
            Arity::Table
        } else {
            Arity::Entry
        };
        let remove_arity = if want.is_empty() {
            Arity::Table
        } else {
            Arity::Entry
        };

        for (key, def) in want {
            let change = match have.get(key) {
                None => Change::Create(def.clone()),
                Some(existing) if existing != def => Change::Update {
                    from: existing.clone(),
                    to: def.clone(),
                },
                Some(_) => continue,
            };
            let arity = if matches!(change, Change::Create(_)) {
                create_arity
            } else {
                Arity::Entry
            };
            out.push(wrap(ConstraintDiff {
                table: table.clone(),
                key: key.clone(),
                arity,
                change,
            }));
        }
        for (key, def) in have {
            if !want.contains_key(key) {
                out.push(wrap(ConstraintDiff {
                    table: table.clone(),
                    key: key.clone(),
                    arity: remove_arity,
                    change: Change::Remove(def.clone()),
                }));
            }
        }
    }
}

/// Compute the differences that turn `actual` into `desired`.
pub fn diff(desired: &SchemaSnapshot, actual: &SchemaSnapshot) -> Vec<Difference> {
    let mut out = Vec::new();

    out.extend(
        diff_set(&desired.schema_info, &actual.schema_info)
            .into_iter()
            .map(Difference::Schema),
    );
    out.extend(
        diff_set(&desired.extensions, &actual.extensions)
            .into_iter()
            .map(Difference::Extension),
    );

    for (name, values) in &desired.enums {
        match actual.enums.get(name) {
            None => out.push(Difference::Enum {
                name: name.clone(),
                change: Change::Create(values.clone()),
            }),
            Some(existing) if existing != values => out.push(Difference::Enum {
                name: name.clone(),
                change: Change::Update {
                    from: existing.clone(),
                    to: values.clone(),
                },
            }),
            Some(_) => {}
        }
    }
    for (name, values) in &actual.enums {
        if !desired.enums.contains_key(name) {
            out.push(Difference::Enum {
                name: name.clone(),
                change: Change::Remove(values.clone()),
            });
        }
    }

    for (name, table) in &desired.tables {
        let Some(existing) = actual.tables.get(name) else {
            out.push(Difference::Table {
                table: name.clone(),
                change: Change::Create(table.clone()),
            });
            continue;
        };

        if existing.name != table.name {
            out.push(Difference::Table {
                table: name.clone(),
                change: Change::Update {
                    from: existing.clone(),
                    to: table.clone(),
                },
            });
        }

        for (column_name, column) in &table.columns {
            match existing.columns.get(column_name) {
                None => out.push(Difference::Column {
                    table: name.clone(),
                    column: column_name.clone(),
                    change: Change::Create(column.clone()),
                }),
                Some(live) => {
                    for attribute in live.changed_attributes(column) {
                        out.push(Difference::ColumnChange {
                            table: name.clone(),
                            column: column_name.clone(),
                            attribute,
                            from: live.clone(),
                            to: column.clone(),
                        });
                    }
                }
            }
        }
        for (column_name, live) in &existing.columns {
            if !table.columns.contains_key(column_name) {
                out.push(Difference::Column {
                    table: name.clone(),
                    column: column_name.clone(),
                    change: Change::Remove(live.clone()),
                });
            }
        }
    }
    for (name, table) in &actual.tables {
        if !desired.tables.contains_key(name) {
            out.push(Difference::Table {
                table: name.clone(),
                change: Change::Remove(table.clone()),
            });
        }
    }

    diff_constraints(&desired.indexes, &actual.indexes, Difference::Index, &mut out);
    diff_constraints(
        &desired.primary_key,
        &actual.primary_key,
        Difference::PrimaryKey,
        &mut out,
    );
    diff_constraints(
        &desired.foreign_key_constraints,
        &actual.foreign_key_constraints,
        Difference::ForeignKey,
        &mut out,
    );
    diff_constraints(
        &desired.unique_constraints,
        &actual.unique_constraints,
        Difference::Unique,
        &mut out,
    );
    diff_constraints(
        &desired.check_constraints,
        &actual.check_constraints,
        Difference::Check,
        &mut out,
    );
    diff_constraints(&desired.triggers, &actual.triggers, Difference::Trigger, &mut out);

    out
}
