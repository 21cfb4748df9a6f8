//! Rename intents persisted on disk.
//!
//! Each declared rename lives in its own JSON file under the renames
//! directory, named `<timestamp>-<kind>-<from>-<to>.json`. File names sort in
//! recording order, which is the order intents are loaded in.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{MigrateResult, MigrationError};
use crate::rename::{RenameIntent, RenameKind};

/// A rename intent with its recording time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentRecord {
    /// When the rename was declared.
    pub recorded_at: DateTime<Utc>,
    /// The rename.
    #[serde(flatten)]
    pub intent: RenameIntent,
}

/// Directory of rename intent files.
#[derive(Debug, Clone)]
pub struct IntentStore {
    dir: PathBuf,
}

impl IntentStore {
    /// Store rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory of the store.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name for an intent recorded at `at`.
    pub fn file_name(intent: &RenameIntent, at: DateTime<Utc>) -> String {
        let from = match intent.kind {
            RenameKind::Table => intent.from.clone(),
            RenameKind::Column => format!("{}.{}", intent.table, intent.from),
        };
        format!(
            "{}-{}-{}-{}.json",
            at.format("%Y%m%d%H%M%S%3f"),
            intent.kind.as_str(),
            sanitize(&from),
            sanitize(&intent.to)
        )
    }

    /// Record a new intent, returning the path written.
    pub async fn record(&self, intent: RenameIntent) -> MigrateResult<PathBuf> {
        self.record_at(intent, Utc::now()).await
    }

    /// Record a new intent with an explicit timestamp.
    pub async fn record_at(&self, intent: RenameIntent, at: DateTime<Utc>) -> MigrateResult<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            MigrationError::intent_file(format!(
                "Failed to create {}: {}",
                self.dir.display(),
                e
            ))
        })?;

        let path = self.dir.join(Self::file_name(&intent, at));
        let record = IntentRecord {
            recorded_at: at,
            intent,
        };
        let content = serde_json::to_string_pretty(&record)?;
        tokio::fs::write(&path, content).await?;

        debug!(path = %path.display(), "Recorded rename intent");
        Ok(path)
    }

    /// Load every record in file name order.
    ///
    /// A missing directory yields no records. Files without a `.json`
    /// extension are ignored.
    pub async fn load_records(&self) -> MigrateResult<Vec<IntentRecord>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut paths = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") && path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();

        let mut records = Vec::with_capacity(paths.len());
        for path in paths {
            let content = tokio::fs::read_to_string(&path).await?;
            let record: IntentRecord = serde_json::from_str(&content).map_err(|e| {
                MigrationError::intent_file(format!("{}: {}", path.display(), e))
            })?;
            records.push(record);
        }

        debug!(dir = %self.dir.display(), count = records.len(), "Loaded rename intents");
        Ok(records)
    }

    /// Load every intent in recording order.
    pub async fn load(&self) -> MigrateResult<Vec<RenameIntent>> {
        Ok(self
            .load_records()
            .await?
            .into_iter()
            .map(|r| r.intent)
            .collect())
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '.' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_file_name() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let name = IntentStore::file_name(&RenameIntent::table("public", "books", "user_books"), at);
        assert_eq!(name, "20240301123000000-table-books-user_books.json");

        let name = IntentStore::file_name(
            &RenameIntent::column("public", "users", "email", "email address"),
            at,
        );
        assert_eq!(name, "20240301123000000-column-users.email-email_address.json");
    }

    #[tokio::test]
    async fn test_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = IntentStore::new(dir.path().join("renames"));
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_records_load_in_recording_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = IntentStore::new(dir.path().join("renames"));

        let first = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let second = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        store
            .record_at(RenameIntent::table("public", "b", "c"), second)
            .await
            .unwrap();
        store
            .record_at(RenameIntent::table("public", "a", "b"), first)
            .await
            .unwrap();
        tokio::fs::write(store.dir().join("README.md"), "notes")
            .await
            .unwrap();

        let intents = store.load().await.unwrap();
        assert_eq!(
            intents,
            vec![
                RenameIntent::table("public", "a", "b"),
                RenameIntent::table("public", "b", "c"),
            ]
        );

        let records = store.load_records().await.unwrap();
        assert_eq!(records[0].recorded_at, first);
    }

    #[tokio::test]
    async fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = IntentStore::new(dir.path());
        tokio::fs::write(dir.path().join("0-table-a-b.json"), "{ not json")
            .await
            .unwrap();
        assert!(matches!(
            store.load().await,
            Err(MigrationError::IntentFile(_))
        ));
    }

    #[test]
    fn test_record_json_shape() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let record = IntentRecord {
            recorded_at: at,
            intent: RenameIntent::column("public", "users", "email", "email_address"),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["kind"], "columnRename");
        assert_eq!(json["table"], "users");
        assert!(json.get("recordedAt").is_some());
    }
}
