//! Raising intents and opening apps.

use serde_json::Value;
use switchboard_context::{Context, Identity};
use switchboard_directory::Application;
use switchboard_events::{event_names, now_ms, IntentResolvedEvent};
use tokio::time::Instant;
use uuid::Uuid;

use super::{aggregate, discover, resolve_target, IntentCandidate, IntentResolution};
use crate::broker::Broker;
use crate::error::{BrokerError, BrokerResult};
use crate::provider::{ContextScope, ResolverOutcome, ResolverRequest};
use crate::registry::Registry;

enum Selection {
    Target(IntentCandidate),
    Discovered(Vec<IntentCandidate>),
}

impl Broker {
    /// Raise `intent` from the `source` window.
    ///
    /// With a `target`, that app handles the intent or the call fails fast.
    /// Without one, candidates are discovered; a single candidate is used
    /// directly, several go through the stored preference and then the
    /// resolver UI.
    pub async fn raise_intent(
        &self,
        source: &Identity,
        intent: &str,
        context: Value,
        target: Option<&str>,
    ) -> BrokerResult<IntentResolution> {
        if intent.trim().is_empty() {
            return Err(BrokerError::invalid("intent", "must not be empty"));
        }
        let context = Context::new(context)?;

        let result = self.resolve_and_deliver(source, intent, &context, target).await;

        let (target, error) = match &result {
            Ok(resolution) => (Some(resolution.source.clone()), None),
            Err(e) => (None, Some(e.to_string())),
        };
        match &error {
            None => tracing::info!(intent, target = ?target, "Intent resolved"),
            Some(e) => tracing::info!(intent, error = %e, "Intent failed"),
        }
        self.events.emit_dto(
            event_names::INTENT_RESOLVED,
            &IntentResolvedEvent {
                intent: intent.to_string(),
                context_type: context.context_type().to_string(),
                target,
                error,
                timestamp_ms: now_ms(),
            },
        );
        result
    }

    /// Open a directory app by name, optionally handing it a context once
    /// it listens for one.
    pub async fn open(&self, app_name: &str, context: Option<Value>) -> BrokerResult<()> {
        let context = context.map(Context::new).transpose()?;
        let directory = self.directory_snapshot().await?;
        let app = directory
            .by_name(app_name)
            .cloned()
            .ok_or_else(|| BrokerError::AppNotFound(app_name.to_string()))?;
        let started = Instant::now();

        let existing = {
            let state = self.state.lock().await;
            state
                .registry
                .app_connections(&app.app_id)
                .first()
                .map(|c| c.identity.clone())
        };
        match existing {
            Some(window) => self.focus(&window).await,
            None => self.ensure_running(&app.app_id, Some(&app)).await?,
        }

        let Some(context) = context else {
            return Ok(());
        };
        let app_id = app.app_id.as_str();
        let target = self
            .wait_for(started, app_id, |registry| {
                registry
                    .app_connections(app_id)
                    .into_iter()
                    .find(|c| c.flat_listener)
                    .map(|c| c.identity.clone())
            })
            .await
            .ok_or_else(|| BrokerError::OpenContextTimeout {
                app: app.name.clone(),
            })?;

        self.transport
            .deliver_context(&target, &ContextScope::Flat, &context)
            .await
            .map_err(|source| BrokerError::Delivery {
                to: target.clone(),
                source,
            })?;
        tracing::info!(app = %app.name, window = %target, "Opened app with context");
        Ok(())
    }

    async fn resolve_and_deliver(
        &self,
        source: &Identity,
        intent: &str,
        context: &Context,
        target: Option<&str>,
    ) -> BrokerResult<IntentResolution> {
        let directory = self.directory_snapshot().await?;
        let context_type = context.context_type();

        let (source_app, selection) = {
            let state = self.state.lock().await;
            let source_app = state.registry.get(source)?.app_id.clone();
            let selection = match target {
                Some(target) => Selection::Target(resolve_target(
                    &state.registry,
                    &directory,
                    target,
                    intent,
                    context_type,
                    Instant::now(),
                )?),
                None => Selection::Discovered(discover(
                    &state.registry,
                    &directory,
                    intent,
                    context_type,
                    Instant::now(),
                )),
            };
            (source_app, selection)
        };

        let candidate = match selection {
            Selection::Target(candidate) => candidate,
            Selection::Discovered(candidates) => {
                self.choose(candidates, &source_app, intent, context).await?
            }
        };
        self.deliver(&candidate, intent, context).await
    }

    /// Narrow several candidates down to one.
    async fn choose(
        &self,
        mut candidates: Vec<IntentCandidate>,
        source_app: &str,
        intent: &str,
        context: &Context,
    ) -> BrokerResult<IntentCandidate> {
        match candidates.len() {
            0 => {
                return Err(BrokerError::NoAppsFound {
                    intent: intent.to_string(),
                    context_type: context.context_type().to_string(),
                })
            }
            1 => return Ok(candidates.remove(0)),
            _ => {}
        }

        let lookup = {
            let (intent, source_app) = (intent.to_string(), source_app.to_string());
            self.with_preferences(move |prefs| {
                prefs.preferred_apps(&intent, Some(source_app.as_str()))
            })
            .await
        };
        match lookup {
            Ok(preferred) => {
                let hit = preferred
                    .iter()
                    .find_map(|app_id| candidates.iter().position(|c| &c.app_id == app_id));
                if let Some(pos) = hit {
                    let chosen = candidates.swap_remove(pos);
                    tracing::debug!(intent, app_id = %chosen.app_id, "Using stored preference");
                    return Ok(chosen);
                }
            }
            Err(e) => tracing::warn!(intent, error = %e, "Failed to read intent preferences"),
        }

        let request = ResolverRequest {
            id: Uuid::new_v4(),
            intent: intent.to_string(),
            context: context.clone(),
            candidates,
        };
        let candidates = request.candidates.clone();
        match self.resolver.submit(request).await? {
            ResolverOutcome::Cancelled => Err(BrokerError::ResolverCancelled),
            ResolverOutcome::Selected { app_id, remember } => {
                let chosen = candidates
                    .into_iter()
                    .find(|c| c.app_id == app_id)
                    .ok_or_else(|| BrokerError::SelectionNotCandidate(app_id.clone()))?;
                if remember {
                    let stored = {
                        let (intent, app_id) = (intent.to_string(), app_id.clone());
                        self.with_preferences(move |prefs| prefs.set_preference(&intent, None, &app_id))
                            .await
                    };
                    if let Err(e) = stored {
                        tracing::warn!(intent, app_id = %app_id, error = %e, "Failed to remember resolver choice");
                    }
                }
                Ok(chosen)
            }
        }
    }

    /// Start the candidate if needed, wait for its handler, and run it.
    async fn deliver(
        &self,
        candidate: &IntentCandidate,
        intent: &str,
        context: &Context,
    ) -> BrokerResult<IntentResolution> {
        let started = Instant::now();
        self.ensure_running(&candidate.app_id, candidate.application.as_ref())
            .await?;

        let app_id = candidate.app_id.as_str();
        let targets = self
            .wait_for(started, app_id, |registry| {
                let listening: Vec<Identity> = registry
                    .app_connections(app_id)
                    .into_iter()
                    .filter(|c| c.has_intent_listener(intent))
                    .map(|c| c.identity.clone())
                    .collect();
                (!listening.is_empty()).then_some(listening)
            })
            .await
            .ok_or_else(|| BrokerError::IntentTimeout {
                app: candidate.name.clone(),
                intent: intent.to_string(),
            })?;

        let aggregated = aggregate(
            self.transport.as_ref(),
            &targets,
            intent,
            context,
            self.config.handler_timeout(),
        )
        .await?;

        if let Some(window) = &aggregated.handled_by {
            self.focus(window).await;
        }
        Ok(IntentResolution {
            source: candidate.name.clone(),
            data: aggregated.data,
        })
    }

    /// Launch the app unless it already has windows or the platform reports
    /// it running.
    async fn ensure_running(&self, app_id: &str, app: Option<&Application>) -> BrokerResult<()> {
        if self.state.lock().await.registry.get_app(app_id).is_some() {
            return Ok(());
        }
        let Some(app) = app else {
            return Err(BrokerError::AppNotFound(app_id.to_string()));
        };
        if self.lifecycle.is_running(app).await {
            tracing::debug!(app = %app.name, "App running without a connection, waiting for it");
            return Ok(());
        }

        tracing::info!(app = %app.name, "Launching app");
        let timeout = self.config.launch_timeout();
        match tokio::time::timeout(timeout, self.lifecycle.launch(app)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(BrokerError::LaunchFailed {
                app: app.name.clone(),
                reason: e.to_string(),
            }),
            Err(_) => Err(BrokerError::LaunchTimeout {
                app: app.name.clone(),
                timeout_ms: self.config.launch_timeout_ms,
            }),
        }
    }

    /// Wait until `probe` finds something in the registry.
    ///
    /// The deadline is `add_listener_timeout` past the moment the app
    /// matures, so windows still starting up get their grace period on top.
    /// An app with no window yet is assumed to connect right away.
    /// Returns `None` once the deadline passes.
    async fn wait_for<T, F>(&self, started: Instant, app_id: &str, probe: F) -> Option<T>
    where
        F: Fn(&Registry) -> Option<T>,
    {
        let maturity = self.config.maturity();
        let grace = self.config.add_listener_timeout();

        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let deadline = {
                let state = self.state.lock().await;
                if let Some(found) = probe(&state.registry) {
                    return Some(found);
                }
                let matures_at = state
                    .registry
                    .app_matures_at(app_id)
                    .unwrap_or(started + maturity);
                matures_at.max(started) + grace
            };

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                let state = self.state.lock().await;
                return probe(&state.registry);
            }
        }
    }
}
