//! Schema namespaces.

use strata_schema::naming::quote_ident;

use crate::changeset::{Changeset, ChangesetKind, Phase, priority};
use crate::context::GeneratorContext;
use crate::diff::Change;
use crate::error::{MigrateResult, MigrationError};

fn create_sql(name: &str) -> String {
    format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(name))
}

fn drop_sql(name: &str) -> String {
    format!("DROP SCHEMA IF EXISTS {}", quote_ident(name))
}

/// Generate changesets for a schema difference.
pub fn generate(
    change: &Change<String>,
    path: &[String],
    ctx: &GeneratorContext<'_>,
) -> MigrateResult<Vec<Changeset>> {
    let changeset = match change {
        Change::Create(name) => Changeset::new(
            ChangesetKind::CreateSchema,
            Phase::Expand,
            priority::CREATE_SCHEMA,
            &ctx.schema,
        )
        .up(create_sql(name))
        .down(drop_sql(name)),
        Change::Remove(name) => Changeset::new(
            ChangesetKind::DropSchema,
            Phase::Contract,
            priority::DROP_SCHEMA,
            &ctx.schema,
        )
        .up(drop_sql(name))
        .down(create_sql(name)),
        Change::Update { .. } => return Err(MigrationError::unresolvable(path.to_vec())),
    };
    Ok(vec![changeset])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rename::ResolvedRenames;
    use strata_schema::SchemaSnapshot;

    #[test]
    fn test_create_and_drop_schema() {
        let snapshot = SchemaSnapshot::new();
        let renames = ResolvedRenames::empty();
        let ctx = GeneratorContext::new("public", &snapshot, &snapshot, &renames);

        let created = generate(&Change::Create("audit".to_string()), &[], &ctx).unwrap();
        assert_eq!(created[0].phase, Phase::Expand);
        assert_eq!(created[0].up_sql(), vec!["CREATE SCHEMA IF NOT EXISTS \"audit\""]);
        assert_eq!(created[0].down_sql(), vec!["DROP SCHEMA IF EXISTS \"audit\""]);

        let dropped = generate(&Change::Remove("audit".to_string()), &[], &ctx).unwrap();
        assert_eq!(dropped[0].phase, Phase::Contract);
        assert_eq!(dropped[0].priority, priority::DROP_SCHEMA);
    }

    #[test]
    fn test_update_is_unresolvable() {
        let snapshot = SchemaSnapshot::new();
        let renames = ResolvedRenames::empty();
        let ctx = GeneratorContext::new("public", &snapshot, &snapshot, &renames);
        let change = Change::Update {
            from: "a".to_string(),
            to: "b".to_string(),
        };
        let path = vec!["schemaInfo".to_string(), "b".to_string()];
        assert!(matches!(
            generate(&change, &path, &ctx),
            Err(MigrationError::UnresolvableDiff { .. })
        ));
    }
}
