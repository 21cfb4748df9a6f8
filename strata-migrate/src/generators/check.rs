//! Check constraints.

use strata_schema::{CheckDefinition, Constraint};

use super::{add_constraint, drop_constraint, dropped_with_table, in_phase, rename_constraint};
use crate::changeset::{Changeset, ChangesetKind, Phase, WarningKind, priority};
use crate::context::GeneratorContext;
use crate::diff::{Change, ConstraintDiff};
use crate::error::MigrateResult;

/// Generate changesets for a check constraint difference.
pub fn generate(
    diff: &ConstraintDiff<CheckDefinition>,
    ctx: &GeneratorContext<'_>,
) -> MigrateResult<Vec<Changeset>> {
    let table = diff.table.as_str();
    let schema = ctx.schema.as_str();
    let changeset = match &diff.change {
        Change::Create(def) => {
            let phase = if ctx.are_new_columns(table, &def.columns) {
                Phase::Expand
            } else {
                Phase::Alter
            };
            let def = in_phase(ctx, phase, table, def);
            let changeset = Changeset::new(
                ChangesetKind::CreateCheckConstraint,
                phase,
                priority::CREATE_CHECK,
                schema,
            )
            .table(ctx.phase_table(phase, table), table)
            .up(add_constraint(ctx, phase, table, &def.name, &def.constraint_sql()));

            if ctx.is_added_table(table) {
                changeset
            } else if phase == Phase::Expand {
                changeset.down(drop_constraint(ctx, phase, table, &def.name))
            } else {
                changeset
                    .down(drop_constraint(ctx, phase, table, &def.name))
                    .warn(
                        WarningKind::FullTableScan,
                        format!("check `{}` scans `{}` under lock", def.name, table),
                    )
            }
        }
        Change::Remove(def) if ctx.is_dropped_table(table) => dropped_with_table(
            ctx,
            ChangesetKind::DropCheckConstraint,
            table,
            vec![add_constraint(ctx, Phase::Contract, table, &def.name, &def.constraint_sql())],
        ),
        Change::Remove(def) => Changeset::new(
            ChangesetKind::DropCheckConstraint,
            Phase::Contract,
            priority::DROP_CHECK,
            schema,
        )
        .table(table, table)
        .up(drop_constraint(ctx, Phase::Contract, table, &def.name))
        .down(add_constraint(ctx, Phase::Contract, table, &def.name, &def.constraint_sql())),
        Change::Update { from, to } if from.same_definition(to) => {
            rename_constraint(ctx, table, priority::RENAME_CHECK, &from.name, &to.name)
        }
        Change::Update { from, to } => Changeset::new(
            ChangesetKind::CreateCheckConstraint,
            Phase::Alter,
            priority::CREATE_CHECK,
            schema,
        )
        .table(table, table)
        .up(drop_constraint(ctx, Phase::Alter, table, &from.name))
        .up(add_constraint(ctx, Phase::Alter, table, &to.name, &to.constraint_sql()))
        .down(drop_constraint(ctx, Phase::Alter, table, &to.name))
        .down(add_constraint(ctx, Phase::Alter, table, &from.name, &from.constraint_sql())),
    };
    Ok(vec![changeset])
}
