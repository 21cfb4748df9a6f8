//! Foreign keys.
//!
//! Keys on populated tables are added `NOT VALID` and validated in a second
//! statement, so existing rows are checked without blocking writes.

use strata_schema::{Constraint, ForeignKeyDefinition};
use strata_schema::naming::quote_ident;

use super::{add_constraint, alter_table, drop_constraint, dropped_with_table, rename_constraint};
use crate::changeset::{Changeset, ChangesetKind, Phase, priority};
use crate::context::GeneratorContext;
use crate::diff::{Change, ConstraintDiff};
use crate::error::MigrateResult;

/// Copy of `def` addressed as `phase` sees it, including the referenced side.
fn in_phase(
    ctx: &GeneratorContext<'_>,
    phase: Phase,
    table: &str,
    def: &ForeignKeyDefinition,
) -> ForeignKeyDefinition {
    let target = def.target_table.clone();
    let mut def = super::in_phase(ctx, phase, table, def);
    def.map_target_columns(&|c| ctx.phase_column(phase, &target, c));
    def
}

/// Generate changesets for a foreign key difference.
pub fn generate(
    diff: &ConstraintDiff<ForeignKeyDefinition>,
    ctx: &GeneratorContext<'_>,
) -> MigrateResult<Vec<Changeset>> {
    let table = diff.table.as_str();
    let schema = ctx.schema.as_str();
    let changeset = match &diff.change {
        Change::Create(def) => create(ctx, table, def),
        Change::Remove(def) if ctx.is_dropped_table(table) => dropped_with_table(
            ctx,
            ChangesetKind::DropForeignKey,
            table,
            vec![add_constraint(ctx, Phase::Contract, table, &def.name, &def.constraint_sql(schema))],
        ),
        Change::Remove(def) => Changeset::new(
            ChangesetKind::DropForeignKey,
            Phase::Contract,
            priority::DROP_FOREIGN_KEY,
            schema,
        )
        .table(table, table)
        .up(drop_constraint(ctx, Phase::Contract, table, &def.name))
        .down(add_constraint(ctx, Phase::Contract, table, &def.name, &def.constraint_sql(schema))),
        Change::Update { from, to } if from.same_definition(to) => {
            rename_constraint(ctx, table, priority::RENAME_FOREIGN_KEY, &from.name, &to.name)
        }
        Change::Update { from, to } => Changeset::new(
            ChangesetKind::CreateForeignKey,
            Phase::Alter,
            priority::CREATE_FOREIGN_KEY,
            schema,
        )
        .table(table, table)
        .up(drop_constraint(ctx, Phase::Alter, table, &from.name))
        .up(add_constraint(ctx, Phase::Alter, table, &to.name, &to.constraint_sql(schema)))
        .down(drop_constraint(ctx, Phase::Alter, table, &to.name))
        .down(add_constraint(ctx, Phase::Alter, table, &from.name, &from.constraint_sql(schema))),
    };
    Ok(vec![changeset])
}

fn create(ctx: &GeneratorContext<'_>, table: &str, def: &ForeignKeyDefinition) -> Changeset {
    let schema = ctx.schema.as_str();
    let phase = if ctx.are_new_columns(table, &def.columns) {
        Phase::Expand
    } else {
        Phase::Alter
    };
    let def = in_phase(ctx, phase, table, def);
    let changeset = Changeset::new(
        ChangesetKind::CreateForeignKey,
        phase,
        priority::CREATE_FOREIGN_KEY,
        schema,
    )
    .table(ctx.phase_table(phase, table), table);

    if ctx.is_added_table(table) {
        return changeset.up(add_constraint(
            ctx,
            phase,
            table,
            &def.name,
            &def.constraint_sql(schema),
        ));
    }
    changeset
        .non_transactional()
        .up(add_constraint(
            ctx,
            phase,
            table,
            &def.name,
            &format!("{} NOT VALID", def.constraint_sql(schema)),
        ))
        .up(format!(
            "{} VALIDATE CONSTRAINT {}",
            alter_table(ctx, phase, table),
            quote_ident(&def.name)
        ))
        .down(drop_constraint(ctx, phase, table, &def.name))
}
