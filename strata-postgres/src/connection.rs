//! PostgreSQL connection used by the migrator.

use async_trait::async_trait;
use deadpool_postgres::Object;
use strata_migrate::{DatabaseError, MigrationConnection};
use tracing::debug;

use crate::error::{PgResult, database_error};

/// A pooled PostgreSQL connection.
///
/// Statements go through the simple query protocol, so DDL that refuses to
/// run in a transaction block (`CREATE INDEX CONCURRENTLY`) works as long as
/// no transaction was opened with [`MigrationConnection::begin`].
pub struct PgConnection {
    client: Object,
}

impl PgConnection {
    pub(crate) fn new(client: Object) -> Self {
        Self { client }
    }

    /// Execute a batch of statements in a single round-trip.
    pub async fn batch_execute(&self, sql: &str) -> PgResult<()> {
        debug!(sql = %sql, "Executing batch");
        self.client.batch_execute(sql).await?;
        Ok(())
    }

    /// Get the underlying tokio-postgres client.
    pub fn inner(&self) -> &Object {
        &self.client
    }
}

#[async_trait]
impl MigrationConnection for PgConnection {
    async fn execute(&mut self, sql: &str) -> Result<(), DatabaseError> {
        debug!(sql = %sql, "Executing statement");
        self.client
            .batch_execute(sql)
            .await
            .map_err(|e| database_error(&e))
    }
}
