//! Extensions.

use strata_schema::naming::quote_ident;

use crate::changeset::{Changeset, ChangesetKind, Phase, priority};
use crate::context::GeneratorContext;
use crate::diff::Change;
use crate::error::{MigrateResult, MigrationError};

fn create_sql(name: &str) -> String {
    format!("CREATE EXTENSION IF NOT EXISTS {}", quote_ident(name))
}

fn drop_sql(name: &str) -> String {
    format!("DROP EXTENSION IF EXISTS {}", quote_ident(name))
}

/// Generate changesets for an extension difference.
pub fn generate(
    change: &Change<String>,
    path: &[String],
    ctx: &GeneratorContext<'_>,
) -> MigrateResult<Vec<Changeset>> {
    let changeset = match change {
        Change::Create(name) => Changeset::new(
            ChangesetKind::CreateExtension,
            Phase::Expand,
            priority::CREATE_EXTENSION,
            &ctx.schema,
        )
        .up(create_sql(name))
        .down(drop_sql(name)),
        Change::Remove(name) => Changeset::new(
            ChangesetKind::DropExtension,
            Phase::Contract,
            priority::DROP_EXTENSION,
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
    fn test_extension_round_trip_statements() {
        let snapshot = SchemaSnapshot::new();
        let renames = ResolvedRenames::empty();
        let ctx = GeneratorContext::new("public", &snapshot, &snapshot, &renames);

        let created = generate(&Change::Create("pgcrypto".to_string()), &[], &ctx).unwrap();
        assert_eq!(
            created[0].up_sql(),
            vec!["CREATE EXTENSION IF NOT EXISTS \"pgcrypto\""]
        );
        assert_eq!(created[0].down_sql(), vec!["DROP EXTENSION IF EXISTS \"pgcrypto\""]);

        let dropped = generate(&Change::Remove("pgcrypto".to_string()), &[], &ctx).unwrap();
        assert_eq!(dropped[0].up, created[0].down);
        assert_eq!(dropped[0].down, created[0].up);
        assert_eq!(dropped[0].phase, Phase::Contract);
    }
}
