//! Collaborator traits.
//!
//! The broker decides; these collaborators act. Launching and focusing
//! windows, moving payloads between processes and drawing the resolver are
//! all behind traits so the decision logic can be driven in tests without
//! any of them.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use switchboard_context::{Context, Identity};
use switchboard_directory::Application;
use switchboard_events::WindowEvent;
use thiserror::Error;
use uuid::Uuid;

use crate::intents::IntentCandidate;

/// Which context listener of a window a delivery targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContextScope {
    /// The window's top-level listener, bound to its current channel.
    Flat,
    /// A listener registered against one channel.
    Channel(String),
}

/// Result of one intent listener: a value, void (`None`), or an error
/// message.
pub type HandlerOutcome = Result<Option<Value>, String>;

#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("window {0} is not reachable")]
    Unreachable(Identity),
    #[error("transport failure: {0}")]
    Failed(String),
}

#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct LifecycleError(pub String);

/// Starts and focuses applications.
#[async_trait]
pub trait AppLifecycle: Send + Sync {
    /// Start the application. Resolves once the platform reports it started;
    /// its windows connect to the broker separately.
    async fn launch(&self, app: &Application) -> Result<(), LifecycleError>;

    async fn is_running(&self, app: &Application) -> bool;

    async fn focus(&self, identity: &Identity) -> Result<(), LifecycleError>;
}

/// Moves payloads to windows.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn deliver_context(
        &self,
        to: &Identity,
        scope: &ContextScope,
        context: &Context,
    ) -> Result<(), TransportError>;

    async fn deliver_event(&self, to: &Identity, event: &WindowEvent)
        -> Result<(), TransportError>;

    /// Run every listener the window registered for `intent`, returning one
    /// outcome per listener.
    async fn deliver_intent(
        &self,
        to: &Identity,
        intent: &str,
        context: &Context,
    ) -> Result<Vec<HandlerOutcome>, TransportError>;
}

/// What the resolver UI is asked to choose between.
#[derive(Debug, Clone, Serialize)]
pub struct ResolverRequest {
    pub id: Uuid,
    pub intent: String,
    pub context: Context,
    pub candidates: Vec<IntentCandidate>,
}

/// What the user did with the resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolverOutcome {
    Selected {
        app_id: String,
        /// Store the choice as the default for this intent.
        remember: bool,
    },
    Cancelled,
}

/// Interactive chooser shown when several apps can handle an intent.
#[async_trait]
pub trait ResolverUi: Send + Sync {
    async fn resolve(&self, request: &ResolverRequest) -> ResolverOutcome;
}

/// Lifecycle that never launches anything.
pub struct NullLifecycle;

#[async_trait]
impl AppLifecycle for NullLifecycle {
    async fn launch(&self, app: &Application) -> Result<(), LifecycleError> {
        Err(LifecycleError(format!("no launcher available for '{}'", app.name)))
    }

    async fn is_running(&self, _app: &Application) -> bool {
        false
    }

    async fn focus(&self, _identity: &Identity) -> Result<(), LifecycleError> {
        Ok(())
    }
}

/// Transport that drops contexts and events and runs no handlers.
pub struct NullTransport;

#[async_trait]
impl Transport for NullTransport {
    async fn deliver_context(
        &self,
        _to: &Identity,
        _scope: &ContextScope,
        _context: &Context,
    ) -> Result<(), TransportError> {
        Ok(())
    }

    async fn deliver_event(
        &self,
        _to: &Identity,
        _event: &WindowEvent,
    ) -> Result<(), TransportError> {
        Ok(())
    }

    async fn deliver_intent(
        &self,
        _to: &Identity,
        _intent: &str,
        _context: &Context,
    ) -> Result<Vec<HandlerOutcome>, TransportError> {
        Ok(Vec::new())
    }
}

/// Resolver that cancels every request.
pub struct CancellingResolver;

#[async_trait]
impl ResolverUi for CancellingResolver {
    async fn resolve(&self, _request: &ResolverRequest) -> ResolverOutcome {
        ResolverOutcome::Cancelled
    }
}
