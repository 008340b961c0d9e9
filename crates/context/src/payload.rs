//! Validated context payload.

use crate::error::{json_kind, ContextError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A context payload exchanged between applications.
///
/// The wrapped value is always a JSON object whose `type` field is a
/// non-empty string. Any other fields are carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct Context {
    context_type: String,
    value: Value,
}

impl Context {
    /// Validate a raw JSON value as a context.
    pub fn new(value: Value) -> Result<Self, ContextError> {
        let object = match &value {
            Value::Object(map) => map,
            other => {
                return Err(ContextError::NotAnObject {
                    found: json_kind(other),
                })
            }
        };

        let context_type = match object.get("type") {
            None => return Err(ContextError::MissingType),
            Some(Value::String(s)) if s.is_empty() => return Err(ContextError::EmptyType),
            Some(Value::String(s)) => s.clone(),
            Some(other) => {
                return Err(ContextError::TypeNotString {
                    found: json_kind(other),
                })
            }
        };

        Ok(Self {
            context_type,
            value,
        })
    }

    /// Build a context carrying only a `type`.
    pub fn of_type(context_type: impl Into<String>) -> Result<Self, ContextError> {
        Self::new(serde_json::json!({ "type": context_type.into() }))
    }

    pub fn context_type(&self) -> &str {
        &self.context_type
    }

    /// Optional display name (`name` field).
    pub fn name(&self) -> Option<&str> {
        self.value.get("name").and_then(Value::as_str)
    }

    /// Optional identifier map (`id` field).
    pub fn id(&self) -> Option<&Value> {
        self.value.get("id")
    }

    pub fn as_value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }
}

impl TryFrom<Value> for Context {
    type Error = ContextError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Context> for Value {
    fn from(context: Context) -> Self {
        context.value
    }
}
