//! Intent resolution.
//!
//! ```text
//! raise_intent(source, intent, context, target?)
//!   │
//!   ├─ target given ──► resolve_target ──────────────┐
//!   │                                                 │
//!   └─ discover candidates                            │
//!        ├─ 0  ► NoAppsFound                          │
//!        ├─ 1  ► fast path ───────────────────────────┤
//!        └─ 2+ ► preference? ──yes───────────────────►┤
//!                    └─no──► ResolverQueue (FIFO) ───►┤
//!                                                     ▼
//!                         ensure_running ► wait for listener ► aggregate
//! ```

mod aggregate;
mod candidates;
mod pipeline;
mod resolver;

pub(crate) use aggregate::aggregate;
pub(crate) use candidates::{discover, find_intent, find_intents_by_context, resolve_target};
pub(crate) use resolver::ResolverQueue;

use serde::Serialize;
use serde_json::Value;
use switchboard_directory::Application;

/// An app that can handle a raised intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentCandidate {
    /// Directory app id, or the launch uuid for ad-hoc apps.
    pub app_id: String,
    pub name: String,
    /// Directory entry; `None` for ad-hoc apps.
    pub application: Option<Application>,
    /// Has at least one live connection.
    pub running: bool,
}

impl IntentCandidate {
    pub(crate) fn from_directory(app: &Application, running: bool) -> Self {
        Self {
            app_id: app.app_id.clone(),
            name: app.name.clone(),
            application: Some(app.clone()),
            running,
        }
    }

    pub(crate) fn ad_hoc(app_id: &str) -> Self {
        Self {
            app_id: app_id.to_string(),
            name: app_id.to_string(),
            application: None,
            running: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentMetadata {
    pub name: String,
    pub display_name: String,
}

/// An intent and the apps that can handle it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppIntentGroup {
    pub intent: IntentMetadata,
    pub apps: Vec<Application>,
}

/// Result of a raised intent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntentResolution {
    /// Name of the app that handled the intent.
    pub source: String,
    /// First non-void handler result.
    pub data: Option<Value>,
}
