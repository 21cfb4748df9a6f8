//! Applies resolved renames to the actual snapshot.
//!
//! The aligned snapshot keys tables and columns by their current names while
//! [`TableInfo::name`](strata_schema::TableInfo) and
//! [`ColumnInfo::column_name`](strata_schema::ColumnInfo) keep the names that
//! exist in the database. Constraint definitions are translated to current
//! names and re-keyed, but keep their live constraint names. Diffing the
//! desired snapshot against the aligned one therefore reports a rename as a
//! change of a name leaf instead of a remove and a create.

use strata_schema::{Constraint, ConstraintMap, ForeignKeyDefinition, SchemaSnapshot, TableInfo};
use tracing::debug;

use crate::rename::ResolvedRenames;

fn align_map<C: Constraint>(
    map: &ConstraintMap<C>,
    schema: &str,
    renames: &ResolvedRenames,
    extra: impl Fn(&mut C),
) -> ConstraintMap<C> {
    let mut aligned = ConstraintMap::new();
    for (table, entries) in map {
        let current = renames.current_table_name(schema, table);
        let target = aligned.entry(current.clone()).or_insert_with(Default::default);
        for def in entries.values() {
            let mut def = def.clone();
            def.map_columns(&|c| renames.current_column_name(schema, &current, c));
            def.map_tables(&|t| renames.current_table_name(schema, t));
            extra(&mut def);
            target.insert(def.key(), def);
        }
    }
    aligned
}

/// Re-key `actual` under current names.
pub fn align(actual: &SchemaSnapshot, renames: &ResolvedRenames, schema: &str) -> SchemaSnapshot {
    if renames.is_empty() {
        return actual.clone();
    }

    let tables = actual
        .tables
        .iter()
        .map(|(key, table)| {
            let current = renames.current_table_name(schema, key);
            let columns = table
                .columns
                .iter()
                .map(|(column_key, column)| {
                    (
                        renames.current_column_name(schema, &current, column_key),
                        column.clone(),
                    )
                })
                .collect();
            (
                current,
                TableInfo {
                    name: table.name.clone(),
                    columns,
                },
            )
        })
        .collect();

    let foreign_key_constraints = align_map(
        &actual.foreign_key_constraints,
        schema,
        renames,
        |fk: &mut ForeignKeyDefinition| {
            let target = fk.target_table.clone();
            fk.map_target_columns(&|c| renames.current_column_name(schema, &target, c));
        },
    );

    let aligned = SchemaSnapshot {
        tables,
        indexes: align_map(&actual.indexes, schema, renames, |_| {}),
        unique_constraints: align_map(&actual.unique_constraints, schema, renames, |_| {}),
        check_constraints: align_map(&actual.check_constraints, schema, renames, |_| {}),
        foreign_key_constraints,
        primary_key: align_map(&actual.primary_key, schema, renames, |_| {}),
        triggers: align_map(&actual.triggers, schema, renames, |_| {}),
        enums: actual.enums.clone(),
        extensions: actual.extensions.clone(),
        table_priorities: actual
            .table_priorities
            .iter()
            .map(|t| renames.current_table_name(schema, t))
            .collect(),
        schema_info: actual.schema_info.clone(),
    };

    debug!(schema, tables = aligned.tables.len(), "Aligned actual snapshot");
    aligned
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rename::{RenameIntent, RenameResolver};
    use pretty_assertions::assert_eq;
    use strata_schema::{
        CheckDefinition, ColumnInfo, ForeignKeyDefinition, IndexDefinition, NamingPolicy,
    };

    fn actual() -> SchemaSnapshot {
        SchemaSnapshot::new()
            .table(TableInfo::new("books").column(ColumnInfo::new("id", "serial").not_null()))
            .table(
                TableInfo::new("users")
                    .column(ColumnInfo::new("id", "serial").not_null())
                    .column(ColumnInfo::new("book_id", "integer"))
                    .column(ColumnInfo::new("mail", "text")),
            )
            .foreign_key("users", ForeignKeyDefinition::new(["book_id"], "books", ["id"]))
            .index("users", IndexDefinition::new(["mail"]))
            .check("users", CheckDefinition::new("length(mail) > 3"))
            .normalized(NamingPolicy::verbatim())
    }

    fn desired() -> SchemaSnapshot {
        SchemaSnapshot::new()
            .table(TableInfo::new("user_books").column(ColumnInfo::new("id", "serial").not_null()))
            .table(
                TableInfo::new("users")
                    .column(ColumnInfo::new("id", "serial").not_null())
                    .column(ColumnInfo::new("book_id", "integer"))
                    .column(ColumnInfo::new("email", "text")),
            )
            .foreign_key(
                "users",
                ForeignKeyDefinition::new(["book_id"], "user_books", ["id"]),
            )
            .index("users", IndexDefinition::new(["email"]))
            .check("users", CheckDefinition::new("length(email) > 3"))
            .normalized(NamingPolicy::verbatim())
    }

    #[test]
    fn test_align_rekeys_tables_and_constraints() {
        let actual = actual();
        let desired = desired();
        let renames = RenameResolver::new(&desired, &actual)
            .resolve(&[
                RenameIntent::table("public", "books", "user_books"),
                RenameIntent::column("public", "users", "mail", "email"),
            ])
            .unwrap();

        let aligned = align(&actual, &renames, "public");

        let books = aligned.get_table("user_books").unwrap();
        assert_eq!(books.name, "books");
        let mail = aligned.get_column("users", "email").unwrap();
        assert_eq!(mail.column_name, "mail");

        // Same keys as the desired side, live names kept.
        let aligned_keys: Vec<&String> = aligned.indexes["users"].keys().collect();
        let desired_keys: Vec<&String> = desired.indexes["users"].keys().collect();
        assert_eq!(aligned_keys, desired_keys);
        let index = aligned.indexes["users"].values().next().unwrap();
        assert_eq!(index.name, actual.indexes["users"].values().next().unwrap().name);

        let fk_keys: Vec<&String> = aligned.foreign_key_constraints["users"].keys().collect();
        let desired_fk_keys: Vec<&String> =
            desired.foreign_key_constraints["users"].keys().collect();
        assert_eq!(fk_keys, desired_fk_keys);

        let check = aligned.check_constraints["users"].values().next().unwrap();
        assert_eq!(check.expression, "length(email) > 3");

        assert_eq!(
            aligned.table_priorities,
            vec!["user_books".to_string(), "users".to_string()]
        );
    }

    #[test]
    fn test_align_without_renames_is_identity() {
        let actual = actual();
        assert_eq!(align(&actual, &ResolvedRenames::empty(), "public"), actual);
    }
}
