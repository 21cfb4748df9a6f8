//! Secondary indexes.
//!
//! Indexes on tables that already hold data are built with
//! `CREATE INDEX CONCURRENTLY` unless the context disables it. Such builds
//! cannot run inside a transaction, so their changesets are marked
//! non-transactional.

use strata_schema::{Constraint, IndexDefinition};

use super::{dropped_with_table, in_phase};
use crate::changeset::{Changeset, ChangesetKind, Operation, Phase, WarningKind, priority};
use crate::context::GeneratorContext;
use crate::diff::{Change, ConstraintDiff};
use crate::error::MigrateResult;

/// Generate changesets for an index difference.
pub fn generate(
    diff: &ConstraintDiff<IndexDefinition>,
    ctx: &GeneratorContext<'_>,
) -> MigrateResult<Vec<Changeset>> {
    let table = diff.table.as_str();
    let changesets = match &diff.change {
        Change::Create(def) => vec![create(ctx, table, def)],
        Change::Remove(def) => vec![remove(ctx, table, def)],
        Change::Update { from, to } if from.same_definition(to) => vec![
            Changeset::new(
                ChangesetKind::RenameIndex,
                Phase::Alter,
                priority::RENAME_INDEX,
                &ctx.schema,
            )
            .table(table, table)
            .up(IndexDefinition::rename_sql(&ctx.schema, &from.name, &to.name))
            .down(IndexDefinition::rename_sql(&ctx.schema, &to.name, &from.name)),
        ],
        Change::Update { from, to } => vec![
            Changeset::new(
                ChangesetKind::CreateIndex,
                Phase::Alter,
                priority::CREATE_INDEX,
                &ctx.schema,
            )
            .table(table, table)
            .up(IndexDefinition::drop_sql(&ctx.schema, &from.name, false))
            .up(to.create_sql(&ctx.schema, table, false))
            .down(IndexDefinition::drop_sql(&ctx.schema, &to.name, false))
            .down(from.create_sql(&ctx.schema, table, false))
            .warn(
                WarningKind::FullTableScan,
                format!("rebuilding index `{}` locks `{}`", to.name, table),
            ),
        ],
    };
    Ok(changesets)
}

fn create(ctx: &GeneratorContext<'_>, table: &str, def: &IndexDefinition) -> Changeset {
    let schema = ctx.schema.as_str();
    let live_table = ctx.phase_table(Phase::Expand, table);
    let def = in_phase(ctx, Phase::Expand, table, def);
    let changeset = Changeset::new(
        ChangesetKind::CreateIndex,
        Phase::Expand,
        priority::CREATE_INDEX,
        schema,
    )
    .table(&live_table, table);

    if ctx.is_added_table(table) {
        // Dropping the table on rollback takes the index with it.
        return changeset.up(def.create_sql(schema, &live_table, false));
    }
    if ctx.concurrent_indexes {
        return changeset
            .non_transactional()
            .up_op(Operation::create_index_concurrently(
                schema,
                &live_table,
                &def.name,
                def.create_sql(schema, &live_table, true),
            ))
            .down(IndexDefinition::drop_sql(schema, &def.name, true));
    }
    changeset
        .up(def.create_sql(schema, &live_table, false))
        .down(IndexDefinition::drop_sql(schema, &def.name, false))
        .warn(
            WarningKind::FullTableScan,
            format!("building index `{}` blocks writes to `{}`", def.name, table),
        )
}

fn remove(ctx: &GeneratorContext<'_>, table: &str, def: &IndexDefinition) -> Changeset {
    let schema = ctx.schema.as_str();
    if ctx.is_dropped_table(table) {
        return dropped_with_table(
            ctx,
            ChangesetKind::DropIndex,
            table,
            vec![def.create_sql(schema, table, false)],
        );
    }

    let changeset = Changeset::new(
        ChangesetKind::DropIndex,
        Phase::Contract,
        priority::DROP_INDEX,
        schema,
    )
    .table(table, table);
    if ctx.concurrent_indexes {
        changeset
            .non_transactional()
            .up(IndexDefinition::drop_sql(schema, &def.name, true))
            .down_op(Operation::create_index_concurrently(
                schema,
                table,
                &def.name,
                def.create_sql(schema, table, true),
            ))
    } else {
        changeset
            .up(IndexDefinition::drop_sql(schema, &def.name, false))
            .down(def.create_sql(schema, table, false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::Arity;
    use crate::rename::ResolvedRenames;
    use pretty_assertions::assert_eq;
    use strata_schema::{ColumnInfo, NamingPolicy, SchemaSnapshot, TableInfo};

    fn index_diff(change: Change<IndexDefinition>) -> ConstraintDiff<IndexDefinition> {
        ConstraintDiff {
            table: "users".to_string(),
            key: "k".to_string(),
            arity: Arity::Entry,
            change,
        }
    }

    fn email_index() -> IndexDefinition {
        let mut def = IndexDefinition::new(["email"]);
        def.name = "users_email_idx".to_string();
        def
    }

    fn users() -> SchemaSnapshot {
        SchemaSnapshot::new()
            .table(TableInfo::new("users").column(ColumnInfo::new("email", "text")))
            .normalized(NamingPolicy::verbatim())
    }

    #[test]
    fn test_concurrent_index_on_existing_table() {
        let snapshot = users();
        let renames = ResolvedRenames::empty();
        let ctx = GeneratorContext::new("public", &snapshot, &snapshot, &renames);

        let changeset = generate(&index_diff(Change::Create(email_index())), &ctx)
            .unwrap()
            .remove(0);
        assert!(!changeset.transaction);
        assert!(matches!(
            changeset.up[0],
            Operation::CreateIndexConcurrently { ref index, .. } if index == "users_email_idx"
        ));
        assert_eq!(
            changeset.up_sql(),
            vec!["CREATE INDEX CONCURRENTLY \"users_email_idx\" ON \"public\".\"users\" (\"email\")"]
        );
        assert_eq!(
            changeset.down_sql(),
            vec!["DROP INDEX CONCURRENTLY IF EXISTS \"public\".\"users_email_idx\""]
        );
    }

    #[test]
    fn test_blocking_index_when_concurrency_disabled() {
        let snapshot = users();
        let renames = ResolvedRenames::empty();
        let ctx = GeneratorContext::new("public", &snapshot, &snapshot, &renames)
            .with_concurrent_indexes(false);

        let changeset = generate(&index_diff(Change::Create(email_index())), &ctx)
            .unwrap()
            .remove(0);
        assert!(changeset.transaction);
        assert!(changeset.has_warning(WarningKind::FullTableScan));
    }

    #[test]
    fn test_index_on_new_table_has_no_rollback() {
        let desired = users();
        let actual = SchemaSnapshot::new();
        let renames = ResolvedRenames::empty();
        let ctx = GeneratorContext::new("public", &desired, &actual, &renames);

        let changeset = generate(&index_diff(Change::Create(email_index())), &ctx)
            .unwrap()
            .remove(0);
        assert!(changeset.transaction);
        assert!(changeset.down.is_empty());
    }

    #[test]
    fn test_index_of_dropped_table_restored_on_rollback() {
        let desired = SchemaSnapshot::new();
        let actual = users();
        let renames = ResolvedRenames::empty();
        let ctx = GeneratorContext::new("public", &desired, &actual, &renames);

        let changeset = generate(&index_diff(Change::Remove(email_index())), &ctx)
            .unwrap()
            .remove(0);
        assert!(changeset.up.is_empty());
        assert_eq!(changeset.priority, priority::DROP_TABLE_OBJECT);
        assert_eq!(
            changeset.down_sql(),
            vec!["CREATE INDEX \"users_email_idx\" ON \"public\".\"users\" (\"email\")"]
        );
    }

    #[test]
    fn test_renamed_index() {
        let snapshot = users();
        let renames = ResolvedRenames::empty();
        let ctx = GeneratorContext::new("public", &snapshot, &snapshot, &renames);
        let from = email_index();
        let mut to = email_index();
        to.name = "accounts_email_idx".to_string();

        let changeset = generate(&index_diff(Change::Update { from, to }), &ctx)
            .unwrap()
            .remove(0);
        assert_eq!(changeset.kind, ChangesetKind::RenameIndex);
        assert_eq!(
            changeset.up_sql(),
            vec!["ALTER INDEX \"public\".\"users_email_idx\" RENAME TO \"accounts_email_idx\""]
        );
    }
}
