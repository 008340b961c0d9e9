//! Window identity.

use crate::error::ContextError;
use serde::{Deserialize, Serialize};

/// Identifies one connected window: the launch `uuid` of its application
/// plus the window `name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Identity {
    pub uuid: String,
    pub name: String,
}

impl Identity {
    /// Create a validated identity.
    pub fn new(uuid: impl Into<String>, name: impl Into<String>) -> Result<Self, ContextError> {
        let identity = Self {
            uuid: uuid.into(),
            name: name.into(),
        };
        identity.validate()?;
        Ok(identity)
    }

    /// Re-check an identity that arrived through deserialization.
    pub fn validate(&self) -> Result<(), ContextError> {
        if self.uuid.trim().is_empty() {
            return Err(ContextError::InvalidIdentity { field: "uuid" });
        }
        if self.name.trim().is_empty() {
            return Err(ContextError::InvalidIdentity { field: "name" });
        }
        Ok(())
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.uuid, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_display() {
        let id = Identity::new("app-1", "main").unwrap();
        assert_eq!(id.to_string(), "app-1/main");
    }

    #[test]
    fn test_identity_rejects_blank_fields() {
        assert_eq!(
            Identity::new("", "main"),
            Err(ContextError::InvalidIdentity { field: "uuid" })
        );
        assert_eq!(
            Identity::new("app-1", "  "),
            Err(ContextError::InvalidIdentity { field: "name" })
        );
    }

    #[test]
    fn test_deserialized_identity_validate() {
        let id: Identity = serde_json::from_str(r#"{"uuid": "a", "name": ""}"#).unwrap();
        assert!(id.validate().is_err());
    }
}
