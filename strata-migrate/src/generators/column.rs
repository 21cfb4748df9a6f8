//! Columns and column attributes.

use strata_schema::naming::{quote_ident, temporary_not_null_check};
use strata_schema::{ColumnAttribute, ColumnInfo, Identity};

use super::alter_table;
use crate::changeset::{Changeset, ChangesetKind, Phase, WarningKind, priority};
use crate::context::GeneratorContext;
use crate::diff::Change;
use crate::error::{MigrateResult, MigrationError};

fn is_serial(data_type: &str) -> bool {
    matches!(data_type, "serial" | "bigserial" | "smallserial")
}

/// Type name usable in `ALTER COLUMN ... TYPE`. Serial pseudo-types only
/// exist at creation time.
fn alter_type(column: &ColumnInfo) -> String {
    match column.data_type.as_str() {
        "serial" => "integer".to_string(),
        "bigserial" => "bigint".to_string(),
        "smallserial" => "smallint".to_string(),
        _ => column.sql_type(),
    }
}

/// Generate changesets for an added or removed column.
pub fn generate(
    table: &str,
    column: &str,
    change: &Change<ColumnInfo>,
    path: &[String],
    ctx: &GeneratorContext<'_>,
) -> MigrateResult<Vec<Changeset>> {
    let schema = ctx.schema.as_str();
    let changeset = match change {
        Change::Create(info) => {
            let alter = alter_table(ctx, Phase::Expand, table);
            let mut changeset = Changeset::new(
                ChangesetKind::CreateColumn,
                Phase::Expand,
                priority::CREATE_COLUMN,
                schema,
            )
            .table(ctx.phase_table(Phase::Expand, table), table)
            .up(format!("{} ADD COLUMN {}", alter, info.definition_sql()))
            .down(format!(
                "{} DROP COLUMN {}",
                alter,
                quote_ident(&info.column_name)
            ));

            if !info.is_nullable
                && info.default_value.is_none()
                && info.identity.is_none()
                && !is_serial(&info.data_type)
            {
                changeset = changeset.warn(
                    WarningKind::NotNullWithoutDefault,
                    format!(
                        "column `{}.{}` is NOT NULL without a default and fails on a non-empty table",
                        table, column
                    ),
                );
            }
            if info.volatile_default {
                changeset = changeset.warn(
                    WarningKind::TableRewrite,
                    format!(
                        "volatile default of `{}.{}` rewrites the table",
                        table, column
                    ),
                );
            }
            changeset
        }
        Change::Remove(info) => {
            let alter = alter_table(ctx, Phase::Contract, table);
            Changeset::new(
                ChangesetKind::DropColumn,
                Phase::Contract,
                priority::DROP_COLUMN,
                schema,
            )
            .table(table, table)
            .up(format!(
                "{} DROP COLUMN {}",
                alter,
                quote_ident(&info.column_name)
            ))
            .down(format!("{} ADD COLUMN {}", alter, info.definition_sql()))
            .warn(
                WarningKind::DataLoss,
                format!("dropping column `{}.{}` deletes its values", table, column),
            )
        }
        Change::Update { .. } => return Err(MigrationError::unresolvable(path.to_vec())),
    };
    Ok(vec![changeset])
}

/// Generate changesets for one changed attribute of an existing column.
///
/// `from` is the aligned actual column and `to` the desired one. All
/// statements run in the alter phase, after renames, so they address the
/// table and column by current name.
pub fn generate_change(
    table: &str,
    attribute: ColumnAttribute,
    from: &ColumnInfo,
    to: &ColumnInfo,
    ctx: &GeneratorContext<'_>,
) -> MigrateResult<Vec<Changeset>> {
    let schema = ctx.schema.as_str();
    let alter = alter_table(ctx, Phase::Alter, table);
    let column = quote_ident(&to.column_name);
    let alter_column = format!("{} ALTER COLUMN {}", alter, column);

    let changeset = match attribute {
        ColumnAttribute::Name => Changeset::new(
            ChangesetKind::RenameColumn,
            Phase::Alter,
            priority::RENAME_COLUMN,
            schema,
        )
        .up(format!(
            "{} RENAME COLUMN {} TO {}",
            alter,
            quote_ident(&from.column_name),
            column
        ))
        .down(format!(
            "{} RENAME COLUMN {} TO {}",
            alter,
            column,
            quote_ident(&from.column_name)
        )),
        ColumnAttribute::DataType => {
            let (new_type, old_type) = (alter_type(to), alter_type(from));
            Changeset::new(
                ChangesetKind::ChangeColumnType,
                Phase::Alter,
                priority::CHANGE_COLUMN_TYPE,
                schema,
            )
            .up(format!(
                "{} TYPE {} USING {}::{}",
                alter_column, new_type, column, new_type
            ))
            .down(format!(
                "{} TYPE {} USING {}::{}",
                alter_column, old_type, column, old_type
            ))
            .warn(
                WarningKind::TableRewrite,
                format!(
                    "changing `{}.{}` from {} to {} may rewrite the table",
                    table, to.column_name, old_type, new_type
                ),
            )
        }
        ColumnAttribute::Default => {
            let set_or_drop = |info: &ColumnInfo| match info.default_expression() {
                Some(expression) => format!("{} SET DEFAULT {}", alter_column, expression),
                None => format!("{} DROP DEFAULT", alter_column),
            };
            Changeset::new(
                ChangesetKind::ChangeColumnDefault,
                Phase::Alter,
                priority::CHANGE_COLUMN_DEFAULT,
                schema,
            )
            .up(set_or_drop(to))
            .down(set_or_drop(from))
        }
        ColumnAttribute::Identity => {
            let transition = |from: Option<Identity>, to: Option<Identity>| match (from, to) {
                (None, Some(identity)) => format!(
                    "{} ADD GENERATED {} AS IDENTITY",
                    alter_column,
                    identity.as_sql()
                ),
                (Some(_), None) => format!("{} DROP IDENTITY IF EXISTS", alter_column),
                (_, Some(identity)) => {
                    format!("{} SET GENERATED {}", alter_column, identity.as_sql())
                }
                (None, None) => String::new(),
            };
            Changeset::new(
                ChangesetKind::ChangeColumnIdentity,
                Phase::Alter,
                priority::CHANGE_COLUMN_IDENTITY,
                schema,
            )
            .up(transition(from.identity, to.identity))
            .down(transition(to.identity, from.identity))
        }
        ColumnAttribute::Nullable => {
            if ctx.primary_key_owns_nullability(table, &to.column_name, to.is_nullable) {
                return Ok(Vec::new());
            }
            let changeset = Changeset::new(
                ChangesetKind::ChangeColumnNullability,
                Phase::Alter,
                priority::CHANGE_COLUMN_NULLABILITY,
                schema,
            );
            if to.is_nullable {
                changeset
                    .up(format!("{} DROP NOT NULL", alter_column))
                    .down(format!("{} SET NOT NULL", alter_column))
            } else {
                // A validated check lets SET NOT NULL skip its own scan.
                let check = quote_ident(&temporary_not_null_check(&to.column_name));
                changeset
                    .non_transactional()
                    .up(format!(
                        "{} ADD CONSTRAINT {} CHECK ({} IS NOT NULL) NOT VALID",
                        alter, check, column
                    ))
                    .up(format!("{} VALIDATE CONSTRAINT {}", alter, check))
                    .up(format!("{} SET NOT NULL", alter_column))
                    .up(format!("{} DROP CONSTRAINT {}", alter, check))
                    .down(format!("{} DROP NOT NULL", alter_column))
            }
        }
    };
    Ok(vec![changeset.table(table, table)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rename::ResolvedRenames;
    use pretty_assertions::assert_eq;
    use strata_schema::{NamingPolicy, PrimaryKeyDefinition, SchemaSnapshot, TableInfo};

    fn users(columns: Vec<ColumnInfo>) -> SchemaSnapshot {
        let mut table = TableInfo::new("users");
        for column in columns {
            table = table.column(column);
        }
        SchemaSnapshot::new()
            .table(table)
            .normalized(NamingPolicy::verbatim())
    }

    #[test]
    fn test_add_not_null_column_warns() {
        let actual = users(vec![ColumnInfo::new("id", "integer")]);
        let desired = users(vec![
            ColumnInfo::new("id", "integer"),
            ColumnInfo::new("email", "text").not_null(),
        ]);
        let renames = ResolvedRenames::empty();
        let ctx = GeneratorContext::new("public", &desired, &actual, &renames);
        let info = ColumnInfo::new("email", "text").not_null();

        let changeset = generate("users", "email", &Change::Create(info), &[], &ctx)
            .unwrap()
            .remove(0);
        assert_eq!(changeset.phase, Phase::Expand);
        assert_eq!(
            changeset.up_sql(),
            vec!["ALTER TABLE \"public\".\"users\" ADD COLUMN \"email\" text NOT NULL"]
        );
        assert_eq!(
            changeset.down_sql(),
            vec!["ALTER TABLE \"public\".\"users\" DROP COLUMN \"email\""]
        );
        assert!(changeset.has_warning(WarningKind::NotNullWithoutDefault));
    }

    #[test]
    fn test_drop_column_is_data_loss() {
        let snapshot = users(vec![]);
        let renames = ResolvedRenames::empty();
        let ctx = GeneratorContext::new("public", &snapshot, &snapshot, &renames);
        let info = ColumnInfo::new("bio", "text");

        let changeset = generate("users", "bio", &Change::Remove(info), &[], &ctx)
            .unwrap()
            .remove(0);
        assert_eq!(changeset.phase, Phase::Contract);
        assert_eq!(changeset.priority, priority::DROP_COLUMN);
        assert!(changeset.has_warning(WarningKind::DataLoss));
        assert_eq!(
            changeset.down_sql(),
            vec!["ALTER TABLE \"public\".\"users\" ADD COLUMN \"bio\" text"]
        );
    }

    #[test]
    fn test_type_change_maps_serial() {
        let snapshot = users(vec![]);
        let renames = ResolvedRenames::empty();
        let ctx = GeneratorContext::new("public", &snapshot, &snapshot, &renames);
        let from = ColumnInfo::new("id", "serial").not_null();
        let to = ColumnInfo::new("id", "bigserial").not_null();

        let changeset = generate_change("users", ColumnAttribute::DataType, &from, &to, &ctx)
            .unwrap()
            .remove(0);
        assert_eq!(
            changeset.up_sql(),
            vec!["ALTER TABLE \"public\".\"users\" ALTER COLUMN \"id\" TYPE bigint USING \"id\"::bigint"]
        );
        assert_eq!(
            changeset.down_sql(),
            vec!["ALTER TABLE \"public\".\"users\" ALTER COLUMN \"id\" TYPE integer USING \"id\"::integer"]
        );
        assert!(changeset.has_warning(WarningKind::TableRewrite));
    }

    #[test]
    fn test_rename_column() {
        let snapshot = users(vec![]);
        let renames = ResolvedRenames::empty();
        let ctx = GeneratorContext::new("public", &snapshot, &snapshot, &renames);
        let from = ColumnInfo::new("title", "text");
        let to = ColumnInfo::new("headline", "text");

        let changeset = generate_change("users", ColumnAttribute::Name, &from, &to, &ctx)
            .unwrap()
            .remove(0);
        assert_eq!(changeset.kind, ChangesetKind::RenameColumn);
        assert_eq!(
            changeset.up_sql(),
            vec!["ALTER TABLE \"public\".\"users\" RENAME COLUMN \"title\" TO \"headline\""]
        );
    }

    #[test]
    fn test_set_not_null_is_staged() {
        let snapshot = users(vec![]);
        let renames = ResolvedRenames::empty();
        let ctx = GeneratorContext::new("public", &snapshot, &snapshot, &renames);
        let from = ColumnInfo::new("email", "text");
        let to = ColumnInfo::new("email", "text").not_null();

        let changeset = generate_change("users", ColumnAttribute::Nullable, &from, &to, &ctx)
            .unwrap()
            .remove(0);
        assert!(!changeset.transaction);
        assert_eq!(
            changeset.up_sql(),
            vec![
                "ALTER TABLE \"public\".\"users\" ADD CONSTRAINT \"email_temporary_not_null_check_constraint\" CHECK (\"email\" IS NOT NULL) NOT VALID",
                "ALTER TABLE \"public\".\"users\" VALIDATE CONSTRAINT \"email_temporary_not_null_check_constraint\"",
                "ALTER TABLE \"public\".\"users\" ALTER COLUMN \"email\" SET NOT NULL",
                "ALTER TABLE \"public\".\"users\" DROP CONSTRAINT \"email_temporary_not_null_check_constraint\"",
            ]
        );
        assert_eq!(
            changeset.down_sql(),
            vec!["ALTER TABLE \"public\".\"users\" ALTER COLUMN \"email\" DROP NOT NULL"]
        );
    }

    #[test]
    fn test_nullability_left_to_new_primary_key() {
        let actual = users(vec![ColumnInfo::new("id", "integer")]);
        let desired = users(vec![ColumnInfo::new("id", "integer").not_null()])
            .primary_key("users", PrimaryKeyDefinition::new(["id"]))
            .normalized(NamingPolicy::verbatim());
        let renames = ResolvedRenames::empty();
        let ctx = GeneratorContext::new("public", &desired, &actual, &renames);
        let from = ColumnInfo::new("id", "integer");
        let to = ColumnInfo::new("id", "integer").not_null();

        let changesets =
            generate_change("users", ColumnAttribute::Nullable, &from, &to, &ctx).unwrap();
        assert!(changesets.is_empty());
    }

    #[test]
    fn test_default_and_identity() {
        let snapshot = users(vec![]);
        let renames = ResolvedRenames::empty();
        let ctx = GeneratorContext::new("public", &snapshot, &snapshot, &renames);

        let from = ColumnInfo::new("status", "text");
        let to = ColumnInfo::new("status", "text").default("'active'");
        let changeset = generate_change("users", ColumnAttribute::Default, &from, &to, &ctx)
            .unwrap()
            .remove(0);
        assert_eq!(
            changeset.up_sql(),
            vec!["ALTER TABLE \"public\".\"users\" ALTER COLUMN \"status\" SET DEFAULT 'active'"]
        );
        assert_eq!(
            changeset.down_sql(),
            vec!["ALTER TABLE \"public\".\"users\" ALTER COLUMN \"status\" DROP DEFAULT"]
        );

        let from = ColumnInfo::new("id", "bigint").not_null();
        let to = ColumnInfo::new("id", "bigint").identity(Identity::Always);
        let changeset = generate_change("users", ColumnAttribute::Identity, &from, &to, &ctx)
            .unwrap()
            .remove(0);
        assert_eq!(
            changeset.up_sql(),
            vec!["ALTER TABLE \"public\".\"users\" ALTER COLUMN \"id\" ADD GENERATED ALWAYS AS IDENTITY"]
        );
        assert_eq!(
            changeset.down_sql(),
            vec!["ALTER TABLE \"public\".\"users\" ALTER COLUMN \"id\" DROP IDENTITY IF EXISTS"]
        );
    }
}
