//! Directory entry types.

use serde::{Deserialize, Serialize};

/// An application declared in the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    /// Unique directory identifier.
    pub app_id: String,

    /// Name used to open or target the application.
    pub name: String,

    /// Launch manifest location, opaque to the broker.
    #[serde(default)]
    pub manifest: String,

    #[serde(default)]
    pub manifest_type: String,

    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    /// Intents the application declares it can handle.
    #[serde(default)]
    pub intents: Vec<AppIntent>,
}

/// One declared intent on an [`Application`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppIntent {
    pub name: String,

    #[serde(default)]
    pub display_name: Option<String>,

    /// Context types accepted. Absent or empty accepts any context.
    #[serde(default)]
    pub contexts: Option<Vec<String>>,
}

impl Application {
    pub fn new(app_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            name: name.into(),
            manifest: String::new(),
            manifest_type: String::new(),
            title: None,
            description: None,
            intents: Vec::new(),
        }
    }

    /// Builder: declare an intent accepting the given context types
    /// (empty slice for "any context").
    pub fn with_intent(mut self, name: impl Into<String>, contexts: &[&str]) -> Self {
        let contexts = if contexts.is_empty() {
            None
        } else {
            Some(contexts.iter().map(|c| (*c).to_string()).collect())
        };
        self.intents.push(AppIntent {
            name: name.into(),
            display_name: None,
            contexts,
        });
        self
    }

    /// Builder: set the manifest location.
    pub fn with_manifest(mut self, manifest: impl Into<String>) -> Self {
        self.manifest = manifest.into();
        self
    }

    /// Title if present, otherwise the name.
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.name)
    }
}

impl AppIntent {
    /// Whether this entry accepts `context_type` (`None` accepts).
    pub fn accepts(&self, context_type: Option<&str>) -> bool {
        match (context_type, self.contexts.as_deref()) {
            (None, _) | (_, None) | (_, Some([])) => true,
            (Some(ty), Some(list)) => list.iter().any(|c| c == ty),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_camel_case() {
        let json = r#"{
            "appId": "charts",
            "name": "Charts",
            "manifest": "https://example.invalid/charts.json",
            "manifestType": "openfin",
            "intents": [{"name": "ViewChart", "displayName": "View Chart", "contexts": ["fdc3.instrument"]}]
        }"#;
        let app: Application = serde_json::from_str(json).unwrap();
        assert_eq!(app.app_id, "charts");
        assert_eq!(app.intents[0].display_name.as_deref(), Some("View Chart"));
        assert_eq!(app.display_title(), "Charts");
    }

    #[test]
    fn test_minimal_entry() {
        let app: Application = serde_json::from_str(r#"{"appId": "a", "name": "A"}"#).unwrap();
        assert!(app.intents.is_empty());
        assert!(app.manifest.is_empty());
    }

    #[test]
    fn test_accepts() {
        let any = AppIntent {
            name: "I".into(),
            display_name: None,
            contexts: None,
        };
        let empty = AppIntent {
            contexts: Some(vec![]),
            ..any.clone()
        };
        let listed = AppIntent {
            contexts: Some(vec!["a".into()]),
            ..any.clone()
        };

        assert!(any.accepts(Some("z")));
        assert!(empty.accepts(Some("z")));
        assert!(listed.accepts(Some("a")));
        assert!(!listed.accepts(Some("z")));
        assert!(listed.accepts(None));
    }
}
