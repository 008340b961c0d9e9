//! Candidate discovery and target lookup.
//!
//! All functions here are pure reads over a registry and a directory
//! snapshot taken under the state lock.

use std::collections::BTreeMap;

use switchboard_directory::{
    declares_intent, intents_for_context, might_support, should_support, AppDirectory, Application,
};
use tokio::time::Instant;

use super::{AppIntentGroup, IntentCandidate, IntentMetadata};
use crate::error::{BrokerError, BrokerResult};
use crate::registry::{AppRecord, Registry};

/// Apps that should be offered for `intent`: directory apps first, in
/// directory order, then running ad-hoc apps by app id.
///
/// A directory app that is already running is only offered when one of its
/// windows registered the intent, unless it connected too recently to have
/// done so yet.
pub(crate) fn discover(
    registry: &Registry,
    directory: &AppDirectory,
    intent: &str,
    context_type: &str,
    now: Instant,
) -> Vec<IntentCandidate> {
    let mut candidates: Vec<IntentCandidate> = directory
        .applications()
        .iter()
        .filter(|app| should_support(app, intent, Some(context_type)))
        .filter_map(|app| {
            let running = registry.get_app(&app.app_id).is_some();
            let offered = !running
                || registry.app_has_intent_listener(&app.app_id, intent)
                || !registry.is_app_mature(&app.app_id, now);
            offered.then(|| IntentCandidate::from_directory(app, running))
        })
        .collect();

    candidates.extend(
        live_ad_hoc(registry, intent).map(|record| IntentCandidate::ad_hoc(&record.app_id)),
    );
    candidates
}

/// Look up an explicitly named target.
///
/// A running, mature directory app that never registered the intent fails
/// right away; one that is not running or still starting up is returned so
/// the caller can launch it and wait for the handler.
pub(crate) fn resolve_target(
    registry: &Registry,
    directory: &AppDirectory,
    target: &str,
    intent: &str,
    context_type: &str,
    now: Instant,
) -> BrokerResult<IntentCandidate> {
    if let Some(app) = directory.by_name_or_id(target) {
        let running = registry.get_app(&app.app_id).is_some();
        let listening = registry.app_has_intent_listener(&app.app_id, intent);
        if should_support(app, intent, Some(context_type)) {
            if running && !listening && registry.is_app_mature(&app.app_id, now) {
                return Err(BrokerError::TargetIntentUnsupported {
                    app: app.name.clone(),
                    intent: intent.to_string(),
                });
            }
            return Ok(IntentCandidate::from_directory(app, running));
        }
        if declares_intent(app, intent) {
            return Err(BrokerError::IntentContextMismatch {
                app: app.name.clone(),
                intent: intent.to_string(),
                context_type: context_type.to_string(),
            });
        }
        if listening {
            return Ok(IntentCandidate::from_directory(app, running));
        }
        return Err(BrokerError::TargetIntentUnsupported {
            app: app.name.clone(),
            intent: intent.to_string(),
        });
    }

    let record = registry
        .apps()
        .filter(|record| record.is_ad_hoc())
        .find(|record| {
            record.app_id == target
                || registry
                    .app_connections(&record.app_id)
                    .iter()
                    .any(|c| c.identity.name == target)
        })
        .ok_or_else(|| BrokerError::TargetAppNotFound(target.to_string()))?;

    if registry.app_has_intent_listener(&record.app_id, intent) {
        Ok(IntentCandidate::ad_hoc(&record.app_id))
    } else {
        Err(BrokerError::TargetIntentUnsupported {
            app: record.app_id.clone(),
            intent: intent.to_string(),
        })
    }
}

/// Apps that might handle `intent`, for discovery UIs.
pub(crate) fn find_intent(
    registry: &Registry,
    directory: &AppDirectory,
    intent: &str,
    context_type: Option<&str>,
) -> BrokerResult<AppIntentGroup> {
    let mut apps: Vec<Application> = directory
        .applications()
        .iter()
        .filter(|app| might_support(app, intent, context_type))
        .cloned()
        .collect();
    apps.extend(live_ad_hoc(registry, intent).map(ad_hoc_application));

    if apps.is_empty() {
        return Err(BrokerError::NoAppsFound {
            intent: intent.to_string(),
            context_type: context_type.unwrap_or("*").to_string(),
        });
    }

    Ok(AppIntentGroup {
        intent: metadata(directory, intent),
        apps,
    })
}

/// Every intent that accepts `context_type`, sorted by intent name.
pub(crate) fn find_intents_by_context(
    registry: &Registry,
    directory: &AppDirectory,
    context_type: &str,
) -> Vec<AppIntentGroup> {
    let mut groups: BTreeMap<String, Vec<Application>> = BTreeMap::new();

    for app in directory.applications() {
        for intent in intents_for_context(app, context_type) {
            groups.entry(intent.to_string()).or_default().push(app.clone());
        }
    }

    for record in registry.apps().filter(|record| record.is_ad_hoc()) {
        let mut intents: Vec<&str> = registry
            .app_connections(&record.app_id)
            .iter()
            .flat_map(|c| c.intent_listeners.iter().map(String::as_str))
            .collect();
        intents.sort_unstable();
        intents.dedup();
        for intent in intents {
            groups
                .entry(intent.to_string())
                .or_default()
                .push(ad_hoc_application(record));
        }
    }

    groups
        .into_iter()
        .map(|(intent, apps)| AppIntentGroup {
            intent: metadata(directory, &intent),
            apps,
        })
        .collect()
}

fn live_ad_hoc<'a>(registry: &'a Registry, intent: &'a str) -> impl Iterator<Item = &'a AppRecord> {
    registry
        .apps()
        .filter(move |record| record.is_ad_hoc() && registry.app_has_intent_listener(&record.app_id, intent))
}

fn ad_hoc_application(record: &AppRecord) -> Application {
    Application::new(record.app_id.clone(), record.app_id.clone())
}

/// Display name from the first directory entry that has one.
fn metadata(directory: &AppDirectory, intent: &str) -> IntentMetadata {
    let display_name = directory
        .applications()
        .iter()
        .flat_map(|app| app.intents.iter())
        .filter(|entry| entry.name == intent)
        .find_map(|entry| entry.display_name.clone())
        .unwrap_or_else(|| intent.to_string());

    IntentMetadata {
        name: intent.to_string(),
        display_name,
    }
}
