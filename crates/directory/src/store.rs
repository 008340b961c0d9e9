//! Persisted directory shards.
//!
//! Each shard is the application list fetched from one source. All shards
//! live in a single versioned document under one storage key, and every
//! write goes through the compare-and-swap retry loop so that concurrent
//! writers never lose each other's shards.

use crate::directory::DirectoryProvider;
use crate::error::{DirectoryError, DirectoryResult};
use crate::types::Application;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use switchboard_storage::{update_with_retry, KeyValueStore, StorageError, DEFAULT_WRITE_ATTEMPTS};

/// Storage key of the directory document.
pub const DIRECTORY_KEY: &str = "switchboard.directory";

/// Current document version.
pub const DIRECTORY_VERSION: u32 = 1;

/// Shard name given to a migrated legacy application list.
pub const LEGACY_SHARD: &str = "legacy";

/// Applications fetched from one directory source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryShard {
    pub source: String,
    #[serde(default)]
    pub applications: Vec<Application>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredDirectory {
    version: u32,
    #[serde(default)]
    shards: Vec<DirectoryShard>,
}

/// Raw stored value, either the current document or a bare legacy list.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredValue {
    Legacy(Vec<Application>),
    Current(StoredDirectory),
}

/// Decoded document plus whether it came from the legacy format.
fn decode(raw: Option<&str>) -> DirectoryResult<(StoredDirectory, bool)> {
    let Some(raw) = raw else {
        return Ok((
            StoredDirectory {
                version: DIRECTORY_VERSION,
                shards: Vec::new(),
            },
            false,
        ));
    };

    match serde_json::from_str::<StoredValue>(raw)? {
        StoredValue::Legacy(applications) => Ok((
            StoredDirectory {
                version: DIRECTORY_VERSION,
                shards: vec![DirectoryShard {
                    source: LEGACY_SHARD.to_string(),
                    applications,
                }],
            },
            true,
        )),
        StoredValue::Current(doc) if doc.version == DIRECTORY_VERSION => Ok((doc, false)),
        StoredValue::Current(doc) => Err(DirectoryError::UnsupportedVersion {
            found: doc.version,
            expected: DIRECTORY_VERSION,
        }),
    }
}

fn into_storage(err: DirectoryError) -> StorageError {
    match err {
        DirectoryError::Storage(e) => e,
        DirectoryError::Malformed(e) => StorageError::SerializationError(e),
        other => StorageError::SerializationError(serde::de::Error::custom(other.to_string())),
    }
}

fn from_storage(err: StorageError) -> DirectoryError {
    match err {
        StorageError::SerializationError(e) => DirectoryError::Malformed(e),
        other => DirectoryError::Storage(other),
    }
}

/// Directory backed by a [`KeyValueStore`].
pub struct DirectoryStore {
    store: Arc<dyn KeyValueStore>,
    key: String,
    max_attempts: usize,
}

impl DirectoryStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            key: DIRECTORY_KEY.to_string(),
            max_attempts: DEFAULT_WRITE_ATTEMPTS,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Read all shards, migrating a legacy list on first read.
    pub fn shards(&self) -> DirectoryResult<Vec<DirectoryShard>> {
        let raw = self.store.get_item(&self.key)?;
        let (doc, migrated) = decode(raw.as_deref())?;
        if !migrated {
            return Ok(doc.shards);
        }

        tracing::info!(key = %self.key, "Migrating legacy directory into a shard");
        let doc = self.update(|_| {})?;
        Ok(doc.shards)
    }

    /// Insert or replace the shard with the same source.
    pub fn upsert_shard(&self, shard: DirectoryShard) -> DirectoryResult<()> {
        if shard.source.trim().is_empty() {
            return Err(DirectoryError::EmptyShardSource);
        }

        let source = shard.source.clone();
        let count = shard.applications.len();
        self.update(|doc| {
            match doc.shards.iter_mut().find(|s| s.source == shard.source) {
                Some(existing) => *existing = shard.clone(),
                None => doc.shards.push(shard.clone()),
            }
        })?;

        tracing::debug!(source = %source, applications = count, "Stored directory shard");
        Ok(())
    }

    /// Remove a shard. Returns whether it existed.
    pub fn remove_shard(&self, source: &str) -> DirectoryResult<bool> {
        let mut removed = false;
        self.update(|doc| {
            let before = doc.shards.len();
            doc.shards.retain(|s| s.source != source);
            removed = doc.shards.len() != before;
        })?;
        Ok(removed)
    }

    /// All applications across shards, de-duplicated by app id; the first
    /// shard to declare an app id wins.
    pub fn merged_applications(&self) -> DirectoryResult<Vec<Application>> {
        let mut seen = HashSet::new();
        let mut merged = Vec::new();
        for shard in self.shards()? {
            for app in shard.applications {
                if seen.insert(app.app_id.clone()) {
                    merged.push(app);
                } else {
                    tracing::debug!(
                        app_id = %app.app_id,
                        source = %shard.source,
                        "Ignoring duplicate directory entry"
                    );
                }
            }
        }
        Ok(merged)
    }

    fn update<F>(&self, mut mutate: F) -> DirectoryResult<StoredDirectory>
    where
        F: FnMut(&mut StoredDirectory),
    {
        let written = update_with_retry(&*self.store, &self.key, self.max_attempts, |current| {
            let (mut doc, _) = decode(current).map_err(into_storage)?;
            mutate(&mut doc);
            Ok(serde_json::to_string(&doc)?)
        })
        .map_err(from_storage)?;

        Ok(serde_json::from_str(&written)?)
    }
}

#[async_trait]
impl DirectoryProvider for DirectoryStore {
    async fn applications(&self) -> DirectoryResult<Vec<Application>> {
        self.merged_applications()
    }
}
