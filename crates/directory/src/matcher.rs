//! Intent capability predicates.
//!
//! Pure functions, no I/O. An app may list the same intent more than once;
//! the entries are treated as the union of their contexts.

use crate::types::Application;

/// Lenient check used by discovery APIs (`find_intent`, intents by
/// context). True when some entry names `intent` and accepts the context.
pub fn might_support(app: &Application, intent: &str, context_type: Option<&str>) -> bool {
    supports(app, intent, context_type)
}

/// Authoritative check used when resolving a raised intent.
pub fn should_support(app: &Application, intent: &str, context_type: Option<&str>) -> bool {
    supports(app, intent, context_type)
}

/// Whether any entry names `intent`, regardless of context.
pub fn declares_intent(app: &Application, intent: &str) -> bool {
    app.intents.iter().any(|i| i.name == intent)
}

/// Names of the intents whose entries accept `context_type`, de-duplicated,
/// in declaration order.
pub fn intents_for_context<'a>(app: &'a Application, context_type: &str) -> Vec<&'a str> {
    let mut names: Vec<&str> = Vec::new();
    for entry in &app.intents {
        if entry.accepts(Some(context_type)) && !names.contains(&entry.name.as_str()) {
            names.push(&entry.name);
        }
    }
    names
}

fn supports(app: &Application, intent: &str, context_type: Option<&str>) -> bool {
    app.intents
        .iter()
        .any(|entry| entry.name == intent && entry.accepts(context_type))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app() -> Application {
        Application::new("p", "P")
            .with_intent("Foo", &[])
            .with_intent("Bar", &["baz"])
            .with_intent("Bar", &["qux"])
    }

    #[test]
    fn test_intent_without_contexts_matches_anything() {
        let app = app();
        assert!(should_support(&app, "Foo", None));
        assert!(should_support(&app, "Foo", Some("anything")));
        assert!(might_support(&app, "Foo", Some("anything")));
    }

    #[test]
    fn test_context_list_restricts() {
        let app = app();
        assert!(should_support(&app, "Bar", Some("baz")));
        assert!(!should_support(&app, "Bar", Some("bar")));
        assert!(should_support(&app, "Bar", None), "omitted context matches");
    }

    #[test]
    fn test_duplicate_entries_union() {
        let app = app();
        assert!(should_support(&app, "Bar", Some("qux")));
        assert!(might_support(&app, "Bar", Some("qux")));
    }

    #[test]
    fn test_undeclared_intent() {
        let app = app();
        assert!(!should_support(&app, "Nope", None));
        assert!(!might_support(&app, "Nope", None));
        assert!(!declares_intent(&app, "Nope"));
        assert!(declares_intent(&app, "Bar"));
    }

    #[test]
    fn test_empty_context_list_same_as_absent() {
        let mut app = Application::new("e", "E").with_intent("Foo", &[]);
        app.intents[0].contexts = Some(Vec::new());
        assert!(should_support(&app, "Foo", Some("x")));
    }

    #[test]
    fn test_intents_for_context() {
        let app = app();
        assert_eq!(intents_for_context(&app, "baz"), vec!["Foo", "Bar"]);
        assert_eq!(intents_for_context(&app, "other"), vec!["Foo"]);
    }
}
