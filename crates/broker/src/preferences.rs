//! Per-user default app for an intent.
//!
//! Stored as one JSON document so that a global default and the defaults
//! for each source app are always read consistently.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use switchboard_storage::{update_with_retry, KeyValueStore, Result};

pub const PREFERENCES_KEY: &str = "switchboard.intentPreferences";

/// Preferred target app ids, keyed by intent name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentPreferences {
    #[serde(default)]
    pub global: BTreeMap<String, String>,
    /// Source app id → intent → target app id.
    #[serde(default)]
    pub per_source: BTreeMap<String, BTreeMap<String, String>>,
}

impl IntentPreferences {
    /// Source-specific preference first, then the global one.
    pub fn preferred_app(&self, intent: &str, source_app: Option<&str>) -> Option<&str> {
        self.preferred_apps(intent, source_app).into_iter().next()
    }

    /// Every stored preference for `intent` in lookup order: the source's
    /// own, then the global one. Duplicates are dropped.
    pub fn preferred_apps(&self, intent: &str, source_app: Option<&str>) -> Vec<&str> {
        let per_source = source_app
            .and_then(|source| self.per_source.get(source))
            .and_then(|prefs| prefs.get(intent));
        let mut apps: Vec<&str> = per_source
            .into_iter()
            .chain(self.global.get(intent))
            .map(String::as_str)
            .collect();
        apps.dedup();
        apps
    }

    fn set(&mut self, intent: &str, source_app: Option<&str>, app_id: &str) {
        let slot = match source_app {
            Some(source) => self.per_source.entry(source.to_string()).or_default(),
            None => &mut self.global,
        };
        slot.insert(intent.to_string(), app_id.to_string());
    }

    fn clear(&mut self, intent: &str, source_app: Option<&str>) -> bool {
        match source_app {
            Some(source) => {
                let Some(prefs) = self.per_source.get_mut(source) else {
                    return false;
                };
                let removed = prefs.remove(intent).is_some();
                if prefs.is_empty() {
                    self.per_source.remove(source);
                }
                removed
            }
            None => self.global.remove(intent).is_some(),
        }
    }
}

#[derive(Clone)]
pub struct PreferenceStore {
    store: Arc<dyn KeyValueStore>,
    key: String,
    max_attempts: usize,
}

impl PreferenceStore {
    pub fn new(store: Arc<dyn KeyValueStore>, max_attempts: usize) -> Self {
        Self {
            store,
            key: PREFERENCES_KEY.to_string(),
            max_attempts,
        }
    }

    pub fn preferences(&self) -> Result<IntentPreferences> {
        parse(self.store.get_item(&self.key)?.as_deref())
    }

    pub fn preferred_app(&self, intent: &str, source_app: Option<&str>) -> Result<Option<String>> {
        Ok(self
            .preferences()?
            .preferred_app(intent, source_app)
            .map(str::to_string))
    }

    pub fn preferred_apps(&self, intent: &str, source_app: Option<&str>) -> Result<Vec<String>> {
        Ok(self
            .preferences()?
            .preferred_apps(intent, source_app)
            .into_iter()
            .map(str::to_string)
            .collect())
    }

    pub fn set_preference(&self, intent: &str, source_app: Option<&str>, app_id: &str) -> Result<()> {
        update_with_retry(self.store.as_ref(), &self.key, self.max_attempts, |current| {
            let mut prefs = parse(current)?;
            prefs.set(intent, source_app, app_id);
            Ok(serde_json::to_string(&prefs)?)
        })?;
        tracing::info!(intent, source_app, app_id, "Stored intent preference");
        Ok(())
    }

    /// Returns whether a preference was removed.
    pub fn clear_preference(&self, intent: &str, source_app: Option<&str>) -> Result<bool> {
        let mut removed = false;
        update_with_retry(self.store.as_ref(), &self.key, self.max_attempts, |current| {
            let mut prefs = parse(current)?;
            removed = prefs.clear(intent, source_app);
            Ok(serde_json::to_string(&prefs)?)
        })?;
        if removed {
            tracing::info!(intent, source_app, "Cleared intent preference");
        }
        Ok(removed)
    }
}

fn parse(raw: Option<&str>) -> Result<IntentPreferences> {
    match raw {
        Some(json) => Ok(serde_json::from_str(json)?),
        None => Ok(IntentPreferences::default()),
    }
}
