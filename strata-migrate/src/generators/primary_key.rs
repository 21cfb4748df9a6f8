//! Primary keys.
//!
//! Adding a key to a populated table avoids the long exclusive lock of a
//! plain `ADD PRIMARY KEY`:
//!
//! 1. build a unique index concurrently,
//! 2. add a `NOT VALID` check standing in for `NOT NULL` on nullable columns,
//! 3. validate the checks,
//! 4. attach the key with `PRIMARY KEY USING INDEX`,
//! 5. drop the checks.
//!
//! Postgres leaves columns `NOT NULL` after their key is dropped, so removal
//! also relaxes the columns the desired schema declares nullable.

use strata_schema::naming::{primary_key_index_name, quote_ident, temporary_not_null_check};
use strata_schema::{Constraint, IndexDefinition, PrimaryKeyDefinition};

use super::{
    add_constraint, alter_table, drop_constraint, dropped_with_table, in_phase, rename_constraint,
};
use crate::changeset::{Changeset, ChangesetKind, Operation, Phase, priority};
use crate::context::GeneratorContext;
use crate::diff::{Change, ConstraintDiff};
use crate::error::MigrateResult;

/// Generate changesets for a primary key difference.
pub fn generate(
    diff: &ConstraintDiff<PrimaryKeyDefinition>,
    ctx: &GeneratorContext<'_>,
) -> MigrateResult<Vec<Changeset>> {
    let table = diff.table.as_str();
    let changeset = match &diff.change {
        Change::Create(def) if ctx.is_added_table(table) => {
            let def = in_phase(ctx, Phase::Expand, table, def);
            Changeset::new(
                ChangesetKind::CreatePrimaryKey,
                Phase::Expand,
                priority::CREATE_PRIMARY_KEY,
                &ctx.schema,
            )
            .table(table, table)
            .up(add_constraint(ctx, Phase::Expand, table, &def.name, &def.constraint_sql()))
        }
        Change::Create(def) => create_online(ctx, table, def),
        Change::Remove(def) if ctx.is_dropped_table(table) => dropped_with_table(
            ctx,
            ChangesetKind::DropPrimaryKey,
            table,
            vec![add_constraint(ctx, Phase::Contract, table, &def.name, &def.constraint_sql())],
        ),
        Change::Remove(def) => remove(ctx, table, def),
        Change::Update { from, to } if from.same_definition(to) => {
            rename_constraint(ctx, table, priority::RENAME_PRIMARY_KEY, &from.name, &to.name)
        }
        Change::Update { from, to } => Changeset::new(
            ChangesetKind::CreatePrimaryKey,
            Phase::Alter,
            priority::CREATE_PRIMARY_KEY,
            &ctx.schema,
        )
        .table(table, table)
        .up(drop_constraint(ctx, Phase::Alter, table, &from.name))
        .up(add_constraint(ctx, Phase::Alter, table, &to.name, &to.constraint_sql()))
        .down(drop_constraint(ctx, Phase::Alter, table, &to.name))
        .down(add_constraint(ctx, Phase::Alter, table, &from.name, &from.constraint_sql())),
    };
    Ok(vec![changeset])
}

fn create_online(ctx: &GeneratorContext<'_>, table: &str, def: &PrimaryKeyDefinition) -> Changeset {
    let schema = ctx.schema.as_str();
    let alter = alter_table(ctx, Phase::Alter, table);
    let index = IndexDefinition {
        name: primary_key_index_name(table),
        columns: def.columns.clone(),
        unique: true,
        method: None,
        predicate: None,
        nulls_not_distinct: false,
    };

    // Columns that may still hold NULLs when the key is attached.
    let nullable: Vec<&String> = def
        .columns
        .iter()
        .filter(|c| {
            ctx.actual
                .get_column(table, c)
                .or_else(|| ctx.desired.get_column(table, c))
                .is_none_or(|column| column.is_nullable)
        })
        .collect();

    let mut changeset = Changeset::new(
        ChangesetKind::CreatePrimaryKey,
        Phase::Alter,
        priority::CREATE_PRIMARY_KEY,
        schema,
    )
    .table(table, table)
    .non_transactional()
    .up_op(Operation::create_index_concurrently(
        schema,
        table,
        &index.name,
        index.create_sql(schema, table, true),
    ));

    for column in &nullable {
        changeset = changeset.up(format!(
            "{} ADD CONSTRAINT {} CHECK ({} IS NOT NULL) NOT VALID",
            alter,
            quote_ident(&temporary_not_null_check(column)),
            quote_ident(column)
        ));
    }
    for column in &nullable {
        changeset = changeset.up(format!(
            "{} VALIDATE CONSTRAINT {}",
            alter,
            quote_ident(&temporary_not_null_check(column))
        ));
    }
    changeset = changeset.up(add_constraint(
        ctx,
        Phase::Alter,
        table,
        &def.name,
        &format!("PRIMARY KEY USING INDEX {}", quote_ident(&index.name)),
    ));
    for column in &nullable {
        changeset = changeset.up(drop_constraint(
            ctx,
            Phase::Alter,
            table,
            &temporary_not_null_check(column),
        ));
    }

    changeset = changeset.down(drop_constraint(ctx, Phase::Alter, table, &def.name));
    for column in &nullable {
        changeset = changeset.down(format!(
            "{} ALTER COLUMN {} DROP NOT NULL",
            alter,
            quote_ident(column)
        ));
    }
    changeset
}

fn remove(ctx: &GeneratorContext<'_>, table: &str, def: &PrimaryKeyDefinition) -> Changeset {
    let alter = alter_table(ctx, Phase::Alter, table);
    let remaining = ctx.desired.primary_key_of(table);
    let relaxed: Vec<&String> = def
        .columns
        .iter()
        .filter(|c| !remaining.is_some_and(|pk| pk.columns.contains(*c)))
        .filter(|c| {
            ctx.desired
                .get_column(table, c)
                .is_some_and(|column| column.is_nullable)
        })
        .collect();

    let mut changeset = Changeset::new(
        ChangesetKind::DropPrimaryKey,
        Phase::Alter,
        priority::DROP_PRIMARY_KEY,
        &ctx.schema,
    )
    .table(table, table)
    .up(drop_constraint(ctx, Phase::Alter, table, &def.name));
    for column in &relaxed {
        changeset = changeset
            .up(format!("{} ALTER COLUMN {} DROP NOT NULL", alter, quote_ident(column)));
    }
    for column in &relaxed {
        changeset = changeset
            .down(format!("{} ALTER COLUMN {} SET NOT NULL", alter, quote_ident(column)));
    }
    changeset.down(add_constraint(ctx, Phase::Alter, table, &def.name, &def.constraint_sql()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::Arity;
    use crate::rename::ResolvedRenames;
    use pretty_assertions::assert_eq;
    use strata_schema::{ColumnInfo, NamingPolicy, SchemaSnapshot, TableInfo};

    fn pk_diff(change: Change<PrimaryKeyDefinition>) -> ConstraintDiff<PrimaryKeyDefinition> {
        ConstraintDiff {
            table: "users".to_string(),
            key: "k".to_string(),
            arity: Arity::Table,
            change,
        }
    }

    fn id_key() -> PrimaryKeyDefinition {
        let mut def = PrimaryKeyDefinition::new(["id"]);
        def.name = "users_pkey".to_string();
        def
    }

    #[test]
    fn test_online_primary_key() {
        let actual = SchemaSnapshot::new()
            .table(TableInfo::new("users").column(ColumnInfo::new("id", "integer")))
            .normalized(NamingPolicy::verbatim());
        let desired = SchemaSnapshot::new()
            .table(TableInfo::new("users").column(ColumnInfo::new("id", "integer").not_null()))
            .primary_key("users", PrimaryKeyDefinition::new(["id"]))
            .normalized(NamingPolicy::verbatim());
        let renames = ResolvedRenames::empty();
        let ctx = GeneratorContext::new("public", &desired, &actual, &renames);

        let changeset = generate(&pk_diff(Change::Create(id_key())), &ctx)
            .unwrap()
            .remove(0);
        assert_eq!(changeset.phase, Phase::Alter);
        assert!(!changeset.transaction);
        assert_eq!(
            changeset.up_sql(),
            vec![
                "CREATE UNIQUE INDEX CONCURRENTLY \"users_pkey_idx\" ON \"public\".\"users\" (\"id\")",
                "ALTER TABLE \"public\".\"users\" ADD CONSTRAINT \"id_temporary_not_null_check_constraint\" CHECK (\"id\" IS NOT NULL) NOT VALID",
                "ALTER TABLE \"public\".\"users\" VALIDATE CONSTRAINT \"id_temporary_not_null_check_constraint\"",
                "ALTER TABLE \"public\".\"users\" ADD CONSTRAINT \"users_pkey\" PRIMARY KEY USING INDEX \"users_pkey_idx\"",
                "ALTER TABLE \"public\".\"users\" DROP CONSTRAINT \"id_temporary_not_null_check_constraint\"",
            ]
        );
        assert_eq!(
            changeset.down_sql(),
            vec![
                "ALTER TABLE \"public\".\"users\" DROP CONSTRAINT \"users_pkey\"",
                "ALTER TABLE \"public\".\"users\" ALTER COLUMN \"id\" DROP NOT NULL",
            ]
        );
    }

    #[test]
    fn test_primary_key_on_new_table() {
        let desired = SchemaSnapshot::new()
            .table(TableInfo::new("users").column(ColumnInfo::new("id", "integer").not_null()))
            .normalized(NamingPolicy::verbatim());
        let actual = SchemaSnapshot::new();
        let renames = ResolvedRenames::empty();
        let ctx = GeneratorContext::new("public", &desired, &actual, &renames);

        let changeset = generate(&pk_diff(Change::Create(id_key())), &ctx)
            .unwrap()
            .remove(0);
        assert_eq!(changeset.phase, Phase::Expand);
        assert_eq!(
            changeset.up_sql(),
            vec!["ALTER TABLE \"public\".\"users\" ADD CONSTRAINT \"users_pkey\" PRIMARY KEY (\"id\")"]
        );
        assert!(changeset.down.is_empty());
    }

    #[test]
    fn test_drop_primary_key_relaxes_columns() {
        let actual = SchemaSnapshot::new()
            .table(TableInfo::new("users").column(ColumnInfo::new("id", "integer").not_null()))
            .primary_key("users", PrimaryKeyDefinition::new(["id"]))
            .normalized(NamingPolicy::verbatim());
        let desired = SchemaSnapshot::new()
            .table(TableInfo::new("users").column(ColumnInfo::new("id", "integer")))
            .normalized(NamingPolicy::verbatim());
        let renames = ResolvedRenames::empty();
        let ctx = GeneratorContext::new("public", &desired, &actual, &renames);

        let changeset = generate(&pk_diff(Change::Remove(id_key())), &ctx)
            .unwrap()
            .remove(0);
        assert_eq!(changeset.priority, priority::DROP_PRIMARY_KEY);
        assert_eq!(
            changeset.up_sql(),
            vec![
                "ALTER TABLE \"public\".\"users\" DROP CONSTRAINT \"users_pkey\"",
                "ALTER TABLE \"public\".\"users\" ALTER COLUMN \"id\" DROP NOT NULL",
            ]
        );
        assert_eq!(
            changeset.down_sql(),
            vec![
                "ALTER TABLE \"public\".\"users\" ALTER COLUMN \"id\" SET NOT NULL",
                "ALTER TABLE \"public\".\"users\" ADD CONSTRAINT \"users_pkey\" PRIMARY KEY (\"id\")",
            ]
        );
    }
}
