//! Broker error types.

use serde::Serialize;
use switchboard_context::{ContextError, Identity};
use switchboard_directory::DirectoryError;
use switchboard_storage::StorageError;
use thiserror::Error;

use crate::provider::TransportError;

/// Result type for broker operations.
pub type BrokerResult<T> = Result<T, BrokerError>;

/// Coarse classification of a [`BrokerError`], stable across variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    CapabilityMismatch,
    Timeout,
    HandlerFailure,
    ResolverCancelled,
    NoCandidates,
    Delivery,
    Storage,
}

/// Errors surfaced to the caller of a broker operation.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Malformed context or identity.
    #[error("validation failed: {0}")]
    Validation(#[from] ContextError),

    /// Malformed argument other than a context or identity.
    #[error("invalid {field}: {reason}")]
    InvalidArgument { field: &'static str, reason: String },

    #[error("connection not found: {0}")]
    ConnectionNotFound(Identity),

    #[error("channel not found: {0}")]
    ChannelNotFound(String),

    #[error("application not found: {0}")]
    AppNotFound(String),

    #[error("target application not found: {0}")]
    TargetAppNotFound(String),

    /// The resolver picked something outside the candidate list.
    #[error("selected application '{0}' is not a candidate")]
    SelectionNotCandidate(String),

    #[error("'{app}' does not handle intent '{intent}' with context '{context_type}'")]
    IntentContextMismatch {
        app: String,
        intent: String,
        context_type: String,
    },

    #[error("'{app}' does not handle intent '{intent}'")]
    TargetIntentUnsupported { app: String, intent: String },

    #[error("timed out launching '{app}' after {timeout_ms}ms")]
    LaunchTimeout { app: String, timeout_ms: u64 },

    #[error("failed to launch '{app}': {reason}")]
    LaunchFailed { app: String, reason: String },

    #[error("timed out waiting for '{app}' to add a listener for intent '{intent}'")]
    IntentTimeout { app: String, intent: String },

    #[error("timed out waiting for '{app}' to add a context listener")]
    OpenContextTimeout { app: String },

    #[error("every handler for intent '{intent}' failed: {}", errors.join("; "))]
    HandlersFailed { intent: String, errors: Vec<String> },

    #[error("resolver closed or cancelled")]
    ResolverCancelled,

    #[error("no applications available to handle intent '{intent}' with context '{context_type}'")]
    NoAppsFound { intent: String, context_type: String },

    #[error("delivery to {to} failed: {source}")]
    Delivery {
        to: Identity,
        #[source]
        source: TransportError,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    /// A blocking storage call panicked or was cancelled.
    #[error("storage task failed: {0}")]
    StorageTask(#[from] tokio::task::JoinError),

    #[error("broker is shutting down")]
    ShuttingDown,
}

impl BrokerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BrokerError::Validation(_) | BrokerError::InvalidArgument { .. } => {
                ErrorKind::Validation
            }
            BrokerError::ConnectionNotFound(_)
            | BrokerError::ChannelNotFound(_)
            | BrokerError::AppNotFound(_)
            | BrokerError::TargetAppNotFound(_)
            | BrokerError::SelectionNotCandidate(_) => ErrorKind::NotFound,
            BrokerError::IntentContextMismatch { .. }
            | BrokerError::TargetIntentUnsupported { .. } => ErrorKind::CapabilityMismatch,
            BrokerError::LaunchTimeout { .. }
            | BrokerError::IntentTimeout { .. }
            | BrokerError::OpenContextTimeout { .. } => ErrorKind::Timeout,
            BrokerError::HandlersFailed { .. } => ErrorKind::HandlerFailure,
            BrokerError::ResolverCancelled => ErrorKind::ResolverCancelled,
            BrokerError::NoAppsFound { .. } => ErrorKind::NoCandidates,
            BrokerError::Delivery { .. }
            | BrokerError::LaunchFailed { .. }
            | BrokerError::ShuttingDown => ErrorKind::Delivery,
            BrokerError::Storage(_) | BrokerError::Directory(_) | BrokerError::StorageTask(_) => {
                ErrorKind::Storage
            }
        }
    }

    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        BrokerError::InvalidArgument {
            field,
            reason: reason.into(),
        }
    }
}
