//! Directory shard persistence across the storage backends.

use std::sync::Arc;
use switchboard_directory::{
    Application, DirectoryProvider, DirectoryShard, DirectoryStore, DIRECTORY_KEY, LEGACY_SHARD,
};
use switchboard_storage::{Database, InMemoryStore, KeyValueStore};

fn shard(source: &str, apps: &[(&str, &str)]) -> DirectoryShard {
    DirectoryShard {
        source: source.to_string(),
        applications: apps
            .iter()
            .map(|(id, name)| Application::new(*id, *name).with_intent("ViewChart", &[]))
            .collect(),
    }
}

#[test]
fn test_legacy_list_is_migrated_once() {
    let kv = Arc::new(InMemoryStore::new());
    kv.set_item(
        DIRECTORY_KEY,
        r#"[{"appId": "charts", "name": "Charts", "intents": [{"name": "ViewChart"}]}]"#,
    )
    .unwrap();

    let dir = DirectoryStore::new(kv.clone());
    let shards = dir.shards().unwrap();
    assert_eq!(shards.len(), 1);
    assert_eq!(shards[0].source, LEGACY_SHARD);
    assert_eq!(shards[0].applications[0].app_id, "charts");

    let stored = kv.get_item(DIRECTORY_KEY).unwrap().unwrap();
    let doc: serde_json::Value = serde_json::from_str(&stored).unwrap();
    assert_eq!(doc["version"], 1, "migrated document is written back");

    let again = dir.shards().unwrap();
    assert_eq!(again, shards);
}

#[test]
fn test_two_writers_keep_each_others_shards() {
    let kv: Arc<dyn KeyValueStore> = Arc::new(Database::open_in_memory().unwrap());
    let first = DirectoryStore::new(kv.clone());
    let second = DirectoryStore::new(kv);

    first.upsert_shard(shard("a", &[("1", "One")])).unwrap();
    second.upsert_shard(shard("b", &[("2", "Two")])).unwrap();

    let sources: Vec<String> = first
        .shards()
        .unwrap()
        .into_iter()
        .map(|s| s.source)
        .collect();
    assert_eq!(sources, vec!["a", "b"]);
}

#[tokio::test]
async fn test_merged_applications_first_shard_wins() {
    let kv = Arc::new(InMemoryStore::new());
    let dir = DirectoryStore::new(kv);
    dir.upsert_shard(shard("a", &[("1", "One"), ("2", "Two")]))
        .unwrap();
    dir.upsert_shard(shard("b", &[("2", "Two (copy)"), ("3", "Three")]))
        .unwrap();

    let apps = dir.applications().await.unwrap();
    let names: Vec<&str> = apps.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["One", "Two", "Three"]);

    let snapshot = dir.snapshot().await.unwrap();
    assert_eq!(snapshot.by_app_id("2").unwrap().name, "Two");
}
