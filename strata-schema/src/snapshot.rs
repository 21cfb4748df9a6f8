//! Snapshot of one schema namespace.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::column::ColumnInfo;
use crate::constraint::{
    CheckDefinition, Constraint, ForeignKeyDefinition, IndexDefinition, PrimaryKeyDefinition,
    TriggerDefinition, UniqueDefinition,
};
use crate::error::{SchemaError, SchemaResult};
use crate::naming::NamingPolicy;
use crate::table::TableInfo;

/// Per-table map of keyed constraint definitions.
pub type ConstraintMap<C> = BTreeMap<String, BTreeMap<String, C>>;

/// A complete description of one schema's tables, columns and constraints.
///
/// Every map is keyed by unqualified table name. Inner constraint maps are
/// keyed by [`Constraint::key`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SchemaSnapshot {
    /// Tables by name.
    pub tables: BTreeMap<String, TableInfo>,
    /// Indexes.
    pub indexes: ConstraintMap<IndexDefinition>,
    /// Unique constraints.
    pub unique_constraints: ConstraintMap<UniqueDefinition>,
    /// Check constraints.
    pub check_constraints: ConstraintMap<CheckDefinition>,
    /// Foreign keys.
    pub foreign_key_constraints: ConstraintMap<ForeignKeyDefinition>,
    /// Primary keys, at most one per table.
    pub primary_key: ConstraintMap<PrimaryKeyDefinition>,
    /// Triggers.
    pub triggers: ConstraintMap<TriggerDefinition>,
    /// Enum types and their values in order.
    pub enums: BTreeMap<String, Vec<String>>,
    /// Installed extensions.
    pub extensions: BTreeSet<String>,
    /// Tables ordered so that referenced tables precede referencing ones.
    pub table_priorities: Vec<String>,
    /// Non-default schemas present.
    pub schema_info: BTreeSet<String>,
}

fn insert_constraint<C: Constraint>(map: &mut ConstraintMap<C>, table: &str, mut def: C) {
    if def.name().is_empty() {
        def.set_name(def.canonical_name(table));
    }
    map.entry(table.to_string())
        .or_default()
        .insert(def.key(), def);
}

fn rekey_map<C: Constraint>(map: &mut ConstraintMap<C>) {
    for entries in map.values_mut() {
        let taken = std::mem::take(entries);
        for def in taken.into_values() {
            entries.insert(def.key(), def);
        }
    }
    map.retain(|_, entries| !entries.is_empty());
}

fn canonicalize_map<C: Constraint>(map: &mut ConstraintMap<C>) {
    for (table, entries) in map.iter_mut() {
        for def in entries.values_mut() {
            def.set_name(def.canonical_name(table));
        }
    }
}

fn check_constraint_columns<C: Constraint>(
    map: &ConstraintMap<C>,
    tables: &BTreeMap<String, TableInfo>,
) -> SchemaResult<()> {
    for (table, entries) in map {
        let Some(info) = tables.get(table) else {
            if let Some(def) = entries.values().next() {
                return Err(SchemaError::unknown_table(C::KIND, def.name(), table));
            }
            continue;
        };
        for def in entries.values() {
            if def.columns().is_empty() && C::KIND != TriggerDefinition::KIND {
                return Err(SchemaError::EmptyConstraint {
                    kind: C::KIND.to_string(),
                    table: table.clone(),
                });
            }
            for column in def.columns() {
                // Index elements may be expressions.
                let is_ident = column
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
                if is_ident && !info.columns.contains_key(column) {
                    return Err(SchemaError::unknown_column(
                        C::KIND,
                        def.name(),
                        table,
                        column,
                    ));
                }
            }
        }
    }
    Ok(())
}

impl SchemaSnapshot {
    /// Create an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a snapshot from JSON.
    pub fn from_json(json: &str) -> SchemaResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> SchemaResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Add a table.
    pub fn table(mut self, table: TableInfo) -> Self {
        self.tables.insert(table.name.clone(), table);
        self
    }

    /// Add an index to `table`.
    pub fn index(mut self, table: &str, index: IndexDefinition) -> Self {
        insert_constraint(&mut self.indexes, table, index);
        self
    }

    /// Add a unique constraint to `table`.
    pub fn unique(mut self, table: &str, unique: UniqueDefinition) -> Self {
        insert_constraint(&mut self.unique_constraints, table, unique);
        self
    }

    /// Add a check constraint to `table`.
    pub fn check(mut self, table: &str, check: CheckDefinition) -> Self {
        insert_constraint(&mut self.check_constraints, table, check);
        self
    }

    /// Add a foreign key to `table`.
    pub fn foreign_key(mut self, table: &str, foreign_key: ForeignKeyDefinition) -> Self {
        insert_constraint(&mut self.foreign_key_constraints, table, foreign_key);
        self
    }

    /// Set the primary key of `table`.
    pub fn primary_key(mut self, table: &str, primary_key: PrimaryKeyDefinition) -> Self {
        self.primary_key.remove(table);
        insert_constraint(&mut self.primary_key, table, primary_key);
        self
    }

    /// Add a trigger to `table`.
    pub fn trigger(mut self, table: &str, trigger: TriggerDefinition) -> Self {
        insert_constraint(&mut self.triggers, table, trigger);
        self
    }

    /// Add an enum type.
    pub fn enum_type<I, S>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enums
            .insert(name.into(), values.into_iter().map(Into::into).collect());
        self
    }

    /// Add an extension.
    pub fn extension(mut self, name: impl Into<String>) -> Self {
        self.extensions.insert(name.into());
        self
    }

    /// Add a non-default schema.
    pub fn schema(mut self, name: impl Into<String>) -> Self {
        self.schema_info.insert(name.into());
        self
    }

    /// Look up a table.
    pub fn get_table(&self, name: &str) -> Option<&TableInfo> {
        self.tables.get(name)
    }

    /// Look up a column.
    pub fn get_column(&self, table: &str, column: &str) -> Option<&ColumnInfo> {
        self.tables.get(table).and_then(|t| t.get_column(column))
    }

    /// The primary key of `table`, if any.
    pub fn primary_key_of(&self, table: &str) -> Option<&PrimaryKeyDefinition> {
        self.primary_key.get(table).and_then(|m| m.values().next())
    }

    /// Position of `table` in the dependency order.
    ///
    /// Unknown tables sort after every known one.
    pub fn table_rank(&self, table: &str) -> usize {
        self.table_priorities
            .iter()
            .position(|t| t == table)
            .unwrap_or(self.table_priorities.len())
    }

    /// Recompute `table_priorities` from the foreign keys.
    ///
    /// Tables caught in a reference cycle keep alphabetical order after all
    /// acyclic tables.
    pub fn compute_table_priorities(&mut self) {
        let mut incoming: BTreeMap<&str, usize> =
            self.tables.keys().map(|t| (t.as_str(), 0)).collect();
        let mut outgoing: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();

        for (table, entries) in &self.foreign_key_constraints {
            if !self.tables.contains_key(table) {
                continue;
            }
            for fk in entries.values() {
                let target = fk.target_table.as_str();
                if target == table || !self.tables.contains_key(target) {
                    continue;
                }
                if outgoing.entry(target).or_default().insert(table.as_str())
                    && let Some(count) = incoming.get_mut(table.as_str())
                {
                    *count += 1;
                }
            }
        }

        let mut ready: VecDeque<&str> = incoming
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(t, _)| *t)
            .collect();
        let mut ordered = Vec::with_capacity(self.tables.len());
        while let Some(table) = ready.pop_front() {
            ordered.push(table.to_string());
            if let Some(dependents) = outgoing.get(table) {
                for dependent in dependents {
                    if let Some(count) = incoming.get_mut(dependent) {
                        *count -= 1;
                        if *count == 0 {
                            ready.push_back(dependent);
                        }
                    }
                }
            }
        }

        if ordered.len() < self.tables.len() {
            let cyclic: Vec<String> = self
                .tables
                .keys()
                .filter(|t| !ordered.contains(t))
                .cloned()
                .collect();
            debug!(tables = ?cyclic, "Foreign key cycle, ordering alphabetically");
            ordered.extend(cyclic);
        }

        self.table_priorities = ordered;
    }

    /// Re-key every constraint map by [`Constraint::key`].
    pub fn rekey(&mut self) {
        rekey_map(&mut self.indexes);
        rekey_map(&mut self.unique_constraints);
        rekey_map(&mut self.check_constraints);
        rekey_map(&mut self.foreign_key_constraints);
        rekey_map(&mut self.primary_key);
        rekey_map(&mut self.triggers);
    }

    /// Give every constraint its canonical name for the owning table.
    pub fn with_canonical_names(mut self) -> Self {
        canonicalize_map(&mut self.indexes);
        canonicalize_map(&mut self.unique_constraints);
        canonicalize_map(&mut self.check_constraints);
        canonicalize_map(&mut self.foreign_key_constraints);
        canonicalize_map(&mut self.primary_key);
        canonicalize_map(&mut self.triggers);
        self
    }

    /// Bring a declared snapshot into canonical form.
    ///
    /// Identifiers go through `policy`, columns are normalized, constraints
    /// get canonical names, maps are re-keyed and table priorities computed.
    pub fn normalized(mut self, policy: NamingPolicy) -> Self {
        if policy.camel_case {
            self = self.apply_policy(policy);
        }
        for table in self.tables.values_mut() {
            let columns = std::mem::take(&mut table.columns);
            table.columns = columns
                .into_iter()
                .map(|(name, column)| (name, column.normalized()))
                .collect();
        }
        let mut snapshot = self.with_canonical_names();
        snapshot.rekey();
        snapshot.compute_table_priorities();
        snapshot
    }

    /// Normalize an introspected snapshot without renaming anything.
    pub fn normalized_actual(mut self) -> Self {
        for table in self.tables.values_mut() {
            let columns = std::mem::take(&mut table.columns);
            table.columns = columns
                .into_iter()
                .map(|(name, column)| (name, column.normalized()))
                .collect();
        }
        self.rekey();
        if self.table_priorities.is_empty() {
            self.compute_table_priorities();
        }
        self
    }

    fn apply_policy(self, policy: NamingPolicy) -> Self {
        let column_sets: BTreeMap<String, BTreeSet<String>> = self
            .tables
            .iter()
            .map(|(name, table)| (name.clone(), table.columns.keys().cloned().collect()))
            .collect();

        let tables = self
            .tables
            .into_values()
            .map(|table| {
                let name = policy.apply(&table.name);
                let columns = table
                    .columns
                    .into_values()
                    .map(|mut column| {
                        column.column_name = policy.apply(&column.column_name);
                        (column.column_name.clone(), column)
                    })
                    .collect();
                (name.clone(), TableInfo { name, columns })
            })
            .collect();

        fn convert<C: Constraint>(
            map: ConstraintMap<C>,
            policy: NamingPolicy,
            column_sets: &BTreeMap<String, BTreeSet<String>>,
        ) -> ConstraintMap<C> {
            map.into_iter()
                .map(|(table, entries)| {
                    let known = column_sets.get(&table).cloned().unwrap_or_default();
                    let entries = entries
                        .into_values()
                        .map(|mut def| {
                            def.map_columns(&|c| {
                                if known.contains(c) {
                                    policy.apply(c)
                                } else {
                                    c.to_string()
                                }
                            });
                            def.map_tables(&|t| policy.apply(t));
                            (def.key(), def)
                        })
                        .collect();
                    (policy.apply(&table), entries)
                })
                .collect()
        }

        let mut foreign_keys = convert(self.foreign_key_constraints, policy, &column_sets);
        for entries in foreign_keys.values_mut() {
            for fk in entries.values_mut() {
                fk.map_target_columns(&|c| policy.apply(c));
            }
        }

        Self {
            tables,
            indexes: convert(self.indexes, policy, &column_sets),
            unique_constraints: convert(self.unique_constraints, policy, &column_sets),
            check_constraints: convert(self.check_constraints, policy, &column_sets),
            foreign_key_constraints: foreign_keys,
            primary_key: convert(self.primary_key, policy, &column_sets),
            triggers: convert(self.triggers, policy, &column_sets),
            enums: self.enums,
            extensions: self.extensions,
            table_priorities: self
                .table_priorities
                .iter()
                .map(|t| policy.apply(t))
                .collect(),
            schema_info: self.schema_info,
        }
    }

    /// Check structural invariants.
    pub fn validate(&self) -> SchemaResult<()> {
        for (table, keys) in &self.primary_key {
            if keys.len() > 1 {
                return Err(SchemaError::MultiplePrimaryKeys {
                    table: table.clone(),
                    count: keys.len(),
                });
            }
        }

        check_constraint_columns(&self.indexes, &self.tables)?;
        check_constraint_columns(&self.unique_constraints, &self.tables)?;
        check_constraint_columns(&self.primary_key, &self.tables)?;
        check_constraint_columns(&self.foreign_key_constraints, &self.tables)?;
        check_constraint_columns(&self.triggers, &self.tables)?;

        for (table, entries) in &self.check_constraints {
            if !self.tables.contains_key(table)
                && let Some(check) = entries.values().next()
            {
                return Err(SchemaError::unknown_table(
                    CheckDefinition::KIND,
                    &check.name,
                    table,
                ));
            }
        }

        for table in self.tables.values() {
            for column in table.columns.values() {
                column.validate_default()?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::ColumnInfo;
    use pretty_assertions::assert_eq;

    fn library() -> SchemaSnapshot {
        SchemaSnapshot::new()
            .table(
                TableInfo::new("users")
                    .column(ColumnInfo::new("id", "serial").not_null())
                    .column(ColumnInfo::new("book_id", "integer")),
            )
            .table(TableInfo::new("books").column(ColumnInfo::new("id", "serial").not_null()))
            .table(
                TableInfo::new("reviews")
                    .column(ColumnInfo::new("id", "serial").not_null())
                    .column(ColumnInfo::new("user_id", "integer")),
            )
            .primary_key("users", PrimaryKeyDefinition::new(["id"]))
            .primary_key("books", PrimaryKeyDefinition::new(["id"]))
            .foreign_key("users", ForeignKeyDefinition::new(["book_id"], "books", ["id"]))
            .foreign_key("reviews", ForeignKeyDefinition::new(["user_id"], "users", ["id"]))
    }

    #[test]
    fn test_table_priorities_follow_foreign_keys() {
        let mut snapshot = library();
        snapshot.compute_table_priorities();
        assert_eq!(
            snapshot.table_priorities,
            vec!["books".to_string(), "users".to_string(), "reviews".to_string()]
        );
        assert_eq!(snapshot.table_rank("books"), 0);
        assert_eq!(snapshot.table_rank("missing"), 3);
    }

    #[test]
    fn test_table_priorities_with_cycle() {
        let mut snapshot = SchemaSnapshot::new()
            .table(TableInfo::new("a").column(ColumnInfo::new("b_id", "integer")))
            .table(TableInfo::new("b").column(ColumnInfo::new("a_id", "integer")))
            .table(TableInfo::new("c"))
            .foreign_key("a", ForeignKeyDefinition::new(["b_id"], "b", ["id"]))
            .foreign_key("b", ForeignKeyDefinition::new(["a_id"], "a", ["id"]));
        snapshot.compute_table_priorities();
        assert_eq!(
            snapshot.table_priorities,
            vec!["c".to_string(), "a".to_string(), "b".to_string()]
        );
    }

    #[test]
    fn test_builder_assigns_canonical_names() {
        let snapshot = library();
        let pk = snapshot.primary_key_of("users").map(|pk| pk.name.clone());
        assert_eq!(pk.as_deref(), Some("users_pkey"));

        let fk = snapshot.foreign_key_constraints["users"]
            .values()
            .next()
            .map(|fk| fk.name.clone())
            .unwrap_or_default();
        assert!(fk.starts_with("users_") && fk.ends_with("_fkey"));
    }

    #[test]
    fn test_validate_rejects_unknown_column() {
        let snapshot = library().index("users", IndexDefinition::new(["missing"]));
        assert!(matches!(
            snapshot.validate(),
            Err(SchemaError::UnknownColumn { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_two_primary_keys() {
        let mut snapshot = library();
        let extra = PrimaryKeyDefinition::new(["book_id"]).with_canonical_name("users");
        snapshot
            .primary_key
            .entry("users".to_string())
            .or_default()
            .insert(extra.key(), extra);
        assert!(matches!(
            snapshot.validate(),
            Err(SchemaError::MultiplePrimaryKeys { count: 2, .. })
        ));
    }

    #[test]
    fn test_validate_accepts_expression_index() {
        let snapshot = library().index("users", IndexDefinition::new(["lower(book_id::text)"]));
        assert!(snapshot.validate().is_ok());
    }

    #[test]
    fn test_camel_case_policy() {
        let declared = SchemaSnapshot::new()
            .table(
                TableInfo::new("userProfiles")
                    .column(ColumnInfo::new("userId", "integer"))
                    .column(ColumnInfo::new("createdAt", "timestamp")),
            )
            .index("userProfiles", IndexDefinition::new(["userId", "createdAt"]));

        let snapshot = declared.normalized(NamingPolicy::camel_case());
        let table = snapshot.get_table("user_profiles");
        assert!(table.is_some());
        assert!(snapshot.get_column("user_profiles", "created_at").is_some());

        let index = snapshot.indexes["user_profiles"]
            .values()
            .next()
            .cloned()
            .unwrap();
        assert_eq!(index.columns, vec!["user_id".to_string(), "created_at".to_string()]);
        assert!(index.name.starts_with("user_profiles_"));
    }

    #[test]
    fn test_json_round_trip_keeps_field_names() {
        let snapshot = library()
            .enum_type("role", ["admin", "member"])
            .normalized(NamingPolicy::verbatim());
        let json = snapshot.to_json().unwrap();
        assert!(json.contains("\"foreignKeyConstraints\""));
        assert!(json.contains("\"tablePriorities\""));
        let parsed = SchemaSnapshot::from_json(&json).unwrap();
        assert_eq!(parsed, snapshot);
    }

    #[test]
    fn test_normalized_rewrites_serial_columns() {
        let snapshot = SchemaSnapshot::new()
            .table(
                TableInfo::new("t").column(
                    ColumnInfo::new("id", "integer")
                        .not_null()
                        .default("nextval('t_id_seq'::regclass)"),
                ),
            )
            .normalized_actual();
        assert_eq!(
            snapshot.get_column("t", "id").map(|c| c.data_type.as_str()),
            Some("serial")
        );
    }
}
