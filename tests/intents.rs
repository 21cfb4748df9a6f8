//! Integration tests for rename intents recorded on disk.

use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use strata::migrate::{
    CONFIG_FILE_NAME, ChangesetKind, IntentStore, MigrateConfig, Planner, RenameIntent,
};
use strata::schema::{ColumnInfo, NamingPolicy, SchemaSnapshot, TableInfo};
use tempfile::TempDir;

fn posts(table: &str, title: &str) -> SchemaSnapshot {
    SchemaSnapshot::new().table(
        TableInfo::new(table)
            .column(ColumnInfo::new("id", "integer").not_null())
            .column(ColumnInfo::new(title, "text")),
    )
}

#[tokio::test]
async fn test_plan_with_recorded_intents() {
    let dir = TempDir::new().unwrap();
    let renames = dir.path().join("renames");
    let store = IntentStore::new(&renames);

    let first = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
    let second = Utc.with_ymd_and_hms(2026, 1, 2, 12, 0, 0).unwrap();
    store
        .record_at(RenameIntent::table("public", "articles", "posts"), first)
        .await
        .unwrap();
    store
        .record_at(
            RenameIntent::column("public", "posts", "name", "title"),
            second,
        )
        .await
        .unwrap();

    let loaded = store.load().await.unwrap();
    assert_eq!(
        loaded,
        vec![
            RenameIntent::table("public", "articles", "posts"),
            RenameIntent::column("public", "posts", "name", "title"),
        ]
    );

    let actual = posts("articles", "name").normalized(NamingPolicy::verbatim());
    let desired = posts("posts", "title");
    let plan = Planner::new(MigrateConfig::new().renames_dir(&renames))
        .plan_with_intents(&desired, &actual)
        .await
        .unwrap();

    let kinds: Vec<ChangesetKind> = plan.changesets.iter().map(|c| c.kind).collect();
    assert_eq!(kinds, vec![ChangesetKind::RenameTable, ChangesetKind::RenameColumn]);
    assert_eq!(
        plan.changesets.alter[1].up_sql(),
        vec!["ALTER TABLE \"public\".\"posts\" RENAME COLUMN \"name\" TO \"title\""]
    );
}

/// Intents whose source no longer exists are ignored once applied.
#[tokio::test]
async fn test_applied_intents_become_stale() {
    let dir = TempDir::new().unwrap();
    let store = IntentStore::new(dir.path());
    store
        .record(RenameIntent::table("public", "articles", "posts"))
        .await
        .unwrap();

    let current = posts("posts", "title");
    let plan = Planner::new(MigrateConfig::new().renames_dir(dir.path()))
        .plan_with_intents(&current, &current.clone().normalized(NamingPolicy::verbatim()))
        .await
        .unwrap();
    assert!(plan.is_empty());
    assert_eq!(plan.renames.stale().len(), 1);
}

#[tokio::test]
async fn test_missing_intent_directory() {
    let dir = TempDir::new().unwrap();
    let store = IntentStore::new(dir.path().join("does-not-exist"));
    assert!(store.load().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_config_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(CONFIG_FILE_NAME);
    let config = MigrateConfig::new()
        .schema("app")
        .camel_case(true)
        .allow_data_loss(true);

    config.save(&path).await.unwrap();
    let loaded = MigrateConfig::load(&path).await.unwrap();
    assert_eq!(loaded, config);
}
