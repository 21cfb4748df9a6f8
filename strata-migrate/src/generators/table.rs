//! Tables.

use strata_schema::TableInfo;

use crate::changeset::{Changeset, ChangesetKind, Phase, WarningKind, priority};
use crate::context::GeneratorContext;
use crate::diff::Change;
use crate::error::{MigrateResult, MigrationError};

/// Generate changesets for a table difference.
pub fn generate(
    table: &str,
    change: &Change<TableInfo>,
    path: &[String],
    ctx: &GeneratorContext<'_>,
) -> MigrateResult<Vec<Changeset>> {
    let schema = ctx.schema.as_str();
    let changeset = match change {
        Change::Create(info) => Changeset::new(
            ChangesetKind::CreateTable,
            Phase::Expand,
            priority::CREATE_TABLE,
            schema,
        )
        .table(&info.name, table)
        .up(info.create_sql(schema))
        .down(info.drop_sql(schema)),
        Change::Remove(info) => Changeset::new(
            ChangesetKind::DropTable,
            Phase::Contract,
            priority::DROP_TABLE,
            schema,
        )
        .table(&info.name, table)
        .up(info.drop_sql(schema))
        .down(info.create_sql(schema))
        .warn(
            WarningKind::DataLoss,
            format!("dropping table `{}` deletes its rows", info.name),
        ),
        Change::Update { from, to } if from.name != to.name => Changeset::new(
            ChangesetKind::RenameTable,
            Phase::Alter,
            priority::RENAME_TABLE,
            schema,
        )
        .table(&from.name, table)
        .up(TableInfo::rename_sql(schema, &from.name, &to.name))
        .down(TableInfo::rename_sql(schema, &to.name, &from.name)),
        Change::Update { .. } => return Err(MigrationError::unresolvable(path.to_vec())),
    };
    Ok(vec![changeset])
}
