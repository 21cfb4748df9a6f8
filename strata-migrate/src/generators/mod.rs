//! Changeset generators, one per entity kind.
//!
//! [`generate`] dispatches a [`Difference`] to the generator of its kind.
//! Every generator receives the same [`GeneratorContext`].

pub mod check;
pub mod column;
pub mod enums;
pub mod extension;
pub mod foreign_key;
pub mod index;
pub mod primary_key;
pub mod schema;
pub mod table;
pub mod trigger;
pub mod unique;

use strata_schema::Constraint;
use strata_schema::naming::{qualified, quote_ident};

use crate::changeset::{Changeset, ChangesetKind, Phase, priority};
use crate::context::GeneratorContext;
use crate::diff::Difference;
use crate::error::MigrateResult;

/// Generate the changesets for one difference.
pub fn generate(difference: &Difference, ctx: &GeneratorContext<'_>) -> MigrateResult<Vec<Changeset>> {
    let path = difference.path();
    match difference {
        Difference::Schema(change) => schema::generate(change, &path, ctx),
        Difference::Extension(change) => extension::generate(change, &path, ctx),
        Difference::Enum { name, change } => enums::generate(name, change, ctx),
        Difference::Table { table, change } => table::generate(table, change, &path, ctx),
        Difference::Column {
            table,
            column,
            change,
        } => column::generate(table, column, change, &path, ctx),
        Difference::ColumnChange {
            table,
            attribute,
            from,
            to,
            ..
        } => column::generate_change(table, *attribute, from, to, ctx),
        Difference::Index(diff) => index::generate(diff, ctx),
        Difference::PrimaryKey(diff) => primary_key::generate(diff, ctx),
        Difference::ForeignKey(diff) => foreign_key::generate(diff, ctx),
        Difference::Unique(diff) => unique::generate(diff, ctx),
        Difference::Check(diff) => check::generate(diff, ctx),
        Difference::Trigger(diff) => trigger::generate(diff, ctx),
    }
}

/// Generate the changesets for every difference, in input order.
pub fn generate_all(
    differences: &[Difference],
    ctx: &GeneratorContext<'_>,
) -> MigrateResult<Vec<Changeset>> {
    let mut changesets = Vec::new();
    for difference in differences {
        changesets.extend(generate(difference, ctx)?);
    }
    Ok(changesets)
}

/// `ALTER TABLE "schema"."table"` addressing `table` as `phase` sees it.
pub(crate) fn alter_table(ctx: &GeneratorContext<'_>, phase: Phase, table: &str) -> String {
    format!(
        "ALTER TABLE {}",
        qualified(&ctx.schema, &ctx.phase_table(phase, table))
    )
}

/// Copy of `def` with columns and referenced tables named as `phase` sees them.
pub(crate) fn in_phase<C: Constraint>(
    ctx: &GeneratorContext<'_>,
    phase: Phase,
    table: &str,
    def: &C,
) -> C {
    let mut def = def.clone();
    if phase == Phase::Expand {
        def.map_columns(&|c| ctx.phase_column(phase, table, c));
        def.map_tables(&|t| ctx.phase_table(phase, t));
    }
    def
}

/// `ALTER TABLE ... ADD CONSTRAINT "name" body`.
pub(crate) fn add_constraint(
    ctx: &GeneratorContext<'_>,
    phase: Phase,
    table: &str,
    name: &str,
    body: &str,
) -> String {
    format!(
        "{} ADD CONSTRAINT {} {}",
        alter_table(ctx, phase, table),
        quote_ident(name),
        body
    )
}

/// `ALTER TABLE ... DROP CONSTRAINT "name"`.
pub(crate) fn drop_constraint(
    ctx: &GeneratorContext<'_>,
    phase: Phase,
    table: &str,
    name: &str,
) -> String {
    format!(
        "{} DROP CONSTRAINT {}",
        alter_table(ctx, phase, table),
        quote_ident(name)
    )
}

/// Alter-phase `RENAME CONSTRAINT` changeset with its reverse.
pub(crate) fn rename_constraint(
    ctx: &GeneratorContext<'_>,
    table: &str,
    priority: u32,
    from: &str,
    to: &str,
) -> Changeset {
    let alter = alter_table(ctx, Phase::Alter, table);
    Changeset::new(ChangesetKind::RenameConstraint, Phase::Alter, priority, &ctx.schema)
        .table(table, table)
        .up(format!(
            "{} RENAME CONSTRAINT {} TO {}",
            alter,
            quote_ident(from),
            quote_ident(to)
        ))
        .down(format!(
            "{} RENAME CONSTRAINT {} TO {}",
            alter,
            quote_ident(to),
            quote_ident(from)
        ))
}

/// Removal of an object that goes away with its dropped table.
///
/// The table drop already removes the object, so only the rollback needs a
/// statement: it recreates the object once the table is back.
pub(crate) fn dropped_with_table(
    ctx: &GeneratorContext<'_>,
    kind: ChangesetKind,
    table: &str,
    restore: Vec<String>,
) -> Changeset {
    let mut changeset = Changeset::new(
        kind,
        Phase::Contract,
        priority::DROP_TABLE_OBJECT,
        &ctx.schema,
    )
    .table(table, table);
    for sql in restore {
        changeset = changeset.down(sql);
    }
    changeset
}
