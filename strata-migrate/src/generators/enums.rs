//! Enum types.
//!
//! Postgres can append or insert enum values but never remove them. Added
//! values are applied with `ALTER TYPE ... ADD VALUE`, which cannot be undone.
//! Removed values stay in the type and the changeset says so.

use strata_schema::naming::qualified;

use crate::changeset::{Changeset, ChangesetKind, Phase, WarningKind, priority};
use crate::context::GeneratorContext;
use crate::diff::Change;
use crate::error::MigrateResult;

fn literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn create_sql(schema: &str, name: &str, values: &[String]) -> String {
    let values: Vec<String> = values.iter().map(|v| literal(v)).collect();
    format!(
        "CREATE TYPE {} AS ENUM ({})",
        qualified(schema, name),
        values.join(", ")
    )
}

fn drop_sql(schema: &str, name: &str) -> String {
    format!("DROP TYPE {}", qualified(schema, name))
}

/// `ADD VALUE` statements that turn `from` into a superset ordered like `to`.
fn add_value_statements(schema: &str, name: &str, from: &[String], to: &[String]) -> Vec<String> {
    let mut present: Vec<&str> = from.iter().map(String::as_str).collect();
    let mut statements = Vec::new();

    for (i, value) in to.iter().enumerate() {
        if present.contains(&value.as_str()) {
            continue;
        }
        let before = to[..i].iter().rev().find(|v| present.contains(&v.as_str()));
        let after = to[i + 1..].iter().find(|v| present.contains(&v.as_str()));
        let position = match (before, after) {
            (Some(prev), _) => format!(" AFTER {}", literal(prev)),
            (None, Some(next)) => format!(" BEFORE {}", literal(next)),
            (None, None) => String::new(),
        };
        statements.push(format!(
            "ALTER TYPE {} ADD VALUE IF NOT EXISTS {}{}",
            qualified(schema, name),
            literal(value),
            position
        ));
        present.push(value);
    }
    statements
}

/// Generate changesets for an enum difference.
pub fn generate(
    name: &str,
    change: &Change<Vec<String>>,
    ctx: &GeneratorContext<'_>,
) -> MigrateResult<Vec<Changeset>> {
    let schema = ctx.schema.as_str();
    let changeset = match change {
        Change::Create(values) => Changeset::new(
            ChangesetKind::CreateEnum,
            Phase::Expand,
            priority::CREATE_ENUM,
            schema,
        )
        .up(create_sql(schema, name, values))
        .down(drop_sql(schema, name)),
        Change::Remove(values) => Changeset::new(
            ChangesetKind::DropEnum,
            Phase::Contract,
            priority::DROP_ENUM,
            schema,
        )
        .up(drop_sql(schema, name))
        .down(create_sql(schema, name, values)),
        Change::Update { from, to } => {
            let mut changeset = Changeset::new(
                ChangesetKind::ChangeEnum,
                Phase::Expand,
                priority::CHANGE_ENUM,
                schema,
            )
            .non_transactional();

            let added = add_value_statements(schema, name, from, to);
            if !added.is_empty() {
                for statement in added {
                    changeset = changeset.up(statement);
                }
                changeset = changeset.warn(
                    WarningKind::Irreversible,
                    format!("values added to enum `{}` cannot be removed on rollback", name),
                );
            }

            let removed: Vec<&str> = from
                .iter()
                .filter(|v| !to.contains(v))
                .map(String::as_str)
                .collect();
            if !removed.is_empty() {
                changeset = changeset.warn(
                    WarningKind::EnumValuesRetained,
                    format!(
                        "enum `{}` keeps values no longer declared: {}",
                        name,
                        removed.join(", ")
                    ),
                );
            }
            changeset
        }
    };
    Ok(vec![changeset])
}
