//! Unique constraints.
//!
//! On a populated table the backing index is built concurrently during
//! expand, then attached with `ADD CONSTRAINT ... UNIQUE USING INDEX` in the
//! alter phase, which only needs a brief lock.

use strata_schema::naming::quote_ident;
use strata_schema::{Constraint, IndexDefinition, UniqueDefinition};

use super::{add_constraint, drop_constraint, dropped_with_table, in_phase, rename_constraint};
use crate::changeset::{Changeset, ChangesetKind, Operation, Phase, priority};
use crate::context::GeneratorContext;
use crate::diff::{Change, ConstraintDiff};
use crate::error::MigrateResult;

/// Generate changesets for a unique constraint difference.
pub fn generate(
    diff: &ConstraintDiff<UniqueDefinition>,
    ctx: &GeneratorContext<'_>,
) -> MigrateResult<Vec<Changeset>> {
    let table = diff.table.as_str();
    let changesets = match &diff.change {
        Change::Create(def) => create(ctx, table, def),
        Change::Remove(def) if ctx.is_dropped_table(table) => vec![dropped_with_table(
            ctx,
            ChangesetKind::DropUniqueConstraint,
            table,
            vec![add_constraint(ctx, Phase::Contract, table, &def.name, &def.constraint_sql())],
        )],
        Change::Remove(def) => vec![
            Changeset::new(
                ChangesetKind::DropUniqueConstraint,
                Phase::Contract,
                priority::DROP_UNIQUE,
                &ctx.schema,
            )
            .table(table, table)
            .up(drop_constraint(ctx, Phase::Contract, table, &def.name))
            .down(add_constraint(ctx, Phase::Contract, table, &def.name, &def.constraint_sql())),
        ],
        Change::Update { from, to } if from.same_definition(to) => vec![rename_constraint(
            ctx,
            table,
            priority::RENAME_UNIQUE,
            &from.name,
            &to.name,
        )],
        Change::Update { from, to } => vec![
            Changeset::new(
                ChangesetKind::CreateUniqueConstraint,
                Phase::Alter,
                priority::CREATE_UNIQUE_CONSTRAINT,
                &ctx.schema,
            )
            .table(table, table)
            .up(drop_constraint(ctx, Phase::Alter, table, &from.name))
            .up(add_constraint(ctx, Phase::Alter, table, &to.name, &to.constraint_sql()))
            .down(drop_constraint(ctx, Phase::Alter, table, &to.name))
            .down(add_constraint(ctx, Phase::Alter, table, &from.name, &from.constraint_sql())),
        ],
    };
    Ok(changesets)
}

fn create(ctx: &GeneratorContext<'_>, table: &str, def: &UniqueDefinition) -> Vec<Changeset> {
    let schema = ctx.schema.as_str();

    if ctx.is_added_table(table) {
        let def = in_phase(ctx, Phase::Expand, table, def);
        return vec![
            Changeset::new(
                ChangesetKind::CreateUniqueConstraint,
                Phase::Expand,
                priority::CREATE_UNIQUE_CONSTRAINT,
                schema,
            )
            .table(table, table)
            .up(add_constraint(ctx, Phase::Expand, table, &def.name, &def.constraint_sql())),
        ];
    }

    let live_table = ctx.phase_table(Phase::Expand, table);
    let index = in_phase(ctx, Phase::Expand, table, def).backing_index();
    let build = Changeset::new(
        ChangesetKind::CreateUniqueIndex,
        Phase::Expand,
        priority::CREATE_UNIQUE_INDEX,
        schema,
    )
    .table(&live_table, table);
    let build = if ctx.concurrent_indexes {
        build
            .non_transactional()
            .up_op(Operation::create_index_concurrently(
                schema,
                &live_table,
                &index.name,
                index.create_sql(schema, &live_table, true),
            ))
            .down(IndexDefinition::drop_sql(schema, &index.name, true))
    } else {
        build
            .up(index.create_sql(schema, &live_table, false))
            .down(IndexDefinition::drop_sql(schema, &index.name, false))
    };

    let attach = Changeset::new(
        ChangesetKind::CreateUniqueConstraint,
        Phase::Alter,
        priority::CREATE_UNIQUE_CONSTRAINT,
        schema,
    )
    .table(table, table)
    .up(add_constraint(
        ctx,
        Phase::Alter,
        table,
        &def.name,
        &format!("UNIQUE USING INDEX {}", quote_ident(&index.name)),
    ))
    .down(drop_constraint(ctx, Phase::Alter, table, &def.name));

    vec![build, attach]
}
