//! Triggers.
//!
//! Triggers are matched by name, so a changed definition is replaced in place.

use strata_schema::TriggerDefinition;

use super::{dropped_with_table, in_phase};
use crate::changeset::{Changeset, ChangesetKind, Phase, priority};
use crate::context::GeneratorContext;
use crate::diff::{Change, ConstraintDiff};
use crate::error::MigrateResult;

/// Generate changesets for a trigger difference.
pub fn generate(
    diff: &ConstraintDiff<TriggerDefinition>,
    ctx: &GeneratorContext<'_>,
) -> MigrateResult<Vec<Changeset>> {
    let table = diff.table.as_str();
    let schema = ctx.schema.as_str();
    let changeset = match &diff.change {
        Change::Create(def) => {
            let phase = if ctx.is_added_table(table)
                || (!def.columns.is_empty() && ctx.are_new_columns(table, &def.columns))
            {
                Phase::Expand
            } else {
                Phase::Alter
            };
            let live_table = ctx.phase_table(phase, table);
            let def = in_phase(ctx, phase, table, def);
            let changeset = Changeset::new(
                ChangesetKind::CreateTrigger,
                phase,
                priority::CREATE_TRIGGER,
                schema,
            )
            .table(&live_table, table)
            .up(def.create_sql(schema, &live_table));
            if ctx.is_added_table(table) {
                changeset
            } else {
                changeset.down(def.drop_sql(schema, &live_table))
            }
        }
        Change::Remove(def) if ctx.is_dropped_table(table) => dropped_with_table(
            ctx,
            ChangesetKind::DropTrigger,
            table,
            vec![def.create_sql(schema, table)],
        ),
        Change::Remove(def) => Changeset::new(
            ChangesetKind::DropTrigger,
            Phase::Contract,
            priority::DROP_TRIGGER,
            schema,
        )
        .table(table, table)
        .up(def.drop_sql(schema, table))
        .down(def.create_sql(schema, table)),
        Change::Update { from, to } => Changeset::new(
            ChangesetKind::CreateTrigger,
            Phase::Alter,
            priority::CREATE_TRIGGER,
            schema,
        )
        .table(table, table)
        .up(from.drop_sql(schema, table))
        .up(to.create_sql(schema, table))
        .down(to.drop_sql(schema, table))
        .down(from.create_sql(schema, table)),
    };
    Ok(vec![changeset])
}
