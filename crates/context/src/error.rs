//! Validation errors for boundary types.

use thiserror::Error;

/// A payload or identity failed validation at the API boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    /// Context must be a JSON object.
    #[error("context must be a JSON object, got {found}")]
    NotAnObject { found: &'static str },

    /// Context object has no `type` field.
    #[error("context is missing the required 'type' field")]
    MissingType,

    /// Context `type` is present but not a string.
    #[error("context 'type' must be a string, got {found}")]
    TypeNotString { found: &'static str },

    /// Context `type` is an empty string.
    #[error("context 'type' must not be empty")]
    EmptyType,

    /// Identity is missing one of its fields.
    #[error("identity field '{field}' must be a non-empty string")]
    InvalidIdentity { field: &'static str },
}

/// Short JSON kind name for error messages.
pub(crate) fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
