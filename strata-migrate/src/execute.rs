//! Running changeset operations on a connection.

use strata_schema::IndexDefinition;
use tracing::{debug, warn};

use crate::changeset::Operation;
use crate::error::DatabaseError;
use crate::migrator::MigrationConnection;

/// Run one operation.
///
/// A concurrent index build that fails with a unique violation leaves an
/// invalid index behind. It is dropped before the original error is
/// returned; a failing cleanup is only logged.
pub async fn run_operation(
    conn: &mut dyn MigrationConnection,
    operation: &Operation,
) -> Result<(), DatabaseError> {
    match operation {
        Operation::Execute(sql) => conn.execute(sql).await,
        Operation::CreateIndexConcurrently {
            schema,
            table,
            index,
            sql,
        } => {
            let Err(err) = conn.execute(sql).await else {
                return Ok(());
            };
            if err.is_unique_violation() {
                warn!(
                    index = %index,
                    table = %table,
                    error = %err,
                    "Concurrent index build hit duplicate values, dropping the invalid index"
                );
                let cleanup = IndexDefinition::drop_sql(schema, index, true);
                if let Err(cleanup_err) = conn.execute(&cleanup).await {
                    warn!(index = %index, error = %cleanup_err, "Failed to drop invalid index");
                }
            }
            Err(err)
        }
    }
}

/// Run operations in order, stopping at the first failure.
pub async fn run_operations(
    conn: &mut dyn MigrationConnection,
    operations: &[Operation],
) -> Result<(), DatabaseError> {
    for operation in operations {
        debug!(sql = %operation, "Executing operation");
        run_operation(conn, operation).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct Recorder {
        statements: Vec<String>,
        fail: Option<(String, DatabaseError)>,
    }

    #[async_trait]
    impl MigrationConnection for Recorder {
        async fn execute(&mut self, sql: &str) -> Result<(), DatabaseError> {
            self.statements.push(sql.to_string());
            match &self.fail {
                Some((failing, err)) if failing == sql => Err(err.clone()),
                _ => Ok(()),
            }
        }
    }

    fn build() -> Operation {
        Operation::create_index_concurrently(
            "public",
            "users",
            "users_email_idx",
            "CREATE UNIQUE INDEX CONCURRENTLY \"users_email_idx\" ON \"public\".\"users\" (\"email\")",
        )
    }

    #[tokio::test]
    async fn test_unique_violation_drops_index_and_keeps_error() {
        let original = DatabaseError::new(
            "23505",
            "could not create unique index \"users_email_idx\"",
        );
        let mut conn = Recorder {
            fail: Some((build().statement().to_string(), original.clone())),
            ..Recorder::default()
        };

        let err = run_operations(&mut conn, &[build(), Operation::sql("SELECT 1")])
            .await
            .unwrap_err();
        assert_eq!(err, original);
        assert_eq!(
            conn.statements,
            vec![
                build().statement().to_string(),
                "DROP INDEX CONCURRENTLY IF EXISTS \"public\".\"users_email_idx\"".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_other_errors_skip_cleanup() {
        let original = DatabaseError::new("57014", "canceling statement due to statement timeout");
        let mut conn = Recorder {
            fail: Some((build().statement().to_string(), original.clone())),
            ..Recorder::default()
        };

        let err = run_operation(&mut conn, &build()).await.unwrap_err();
        assert_eq!(err, original);
        assert_eq!(conn.statements.len(), 1);
    }

    #[tokio::test]
    async fn test_runs_in_order() {
        let mut conn = Recorder::default();
        run_operations(&mut conn, &[Operation::sql("A"), build(), Operation::sql("B")])
            .await
            .unwrap();
        assert_eq!(conn.statements.len(), 3);
        assert_eq!(conn.statements[2], "B");
    }
}
