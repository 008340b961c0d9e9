//! The broker facade.
//!
//! Every public operation validates its input, applies the state change
//! under one lock, releases the lock, and only then talks to collaborators.

use std::sync::Arc;

use serde_json::Value;
use switchboard_context::{Context, Identity};
use switchboard_directory::{AppDirectory, DirectoryProvider, StaticDirectory};
use switchboard_events::{
    event_names, now_ms, ChannelChangedEvent, ChannelEventType, ContextBroadcastEvent, EventBusRef,
    EventType, NullEventBus, WindowConnectedEvent, WindowDisconnectedEvent,
};
use switchboard_storage::{InMemoryStore, KeyValueStore};
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::channels::{ChannelEngine, ChannelInfo, Effect, Transition, DEFAULT_CHANNEL_ID};
use crate::config::{BrokerConfig, ConfigError};
use crate::error::{BrokerError, BrokerResult};
use crate::intents::{self, AppIntentGroup, ResolverQueue};
use crate::preferences::PreferenceStore;
use crate::provider::{
    AppLifecycle, CancellingResolver, NullLifecycle, NullTransport, ResolverUi, Transport,
};
use crate::registry::{AppRecord, Connection, Registry};

/// Mutable broker state. Always locked as a whole.
pub(crate) struct BrokerState {
    pub registry: Registry,
    pub channels: ChannelEngine,
}

pub struct Broker {
    pub(crate) state: Mutex<BrokerState>,
    /// Signalled after any registration change; handshake waits observe it.
    pub(crate) changed: Notify,
    pub(crate) config: BrokerConfig,
    pub(crate) directory: Arc<dyn DirectoryProvider>,
    pub(crate) lifecycle: Arc<dyn AppLifecycle>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) resolver: ResolverQueue,
    pub(crate) preferences: PreferenceStore,
    pub(crate) events: EventBusRef,
    cancel: CancellationToken,
}

/// Builder for [`Broker`]. Unset collaborators fall back to their null
/// implementations, preferences to an in-memory store.
pub struct BrokerBuilder {
    config: BrokerConfig,
    directory: Option<Arc<dyn DirectoryProvider>>,
    lifecycle: Option<Arc<dyn AppLifecycle>>,
    transport: Option<Arc<dyn Transport>>,
    resolver: Option<Arc<dyn ResolverUi>>,
    store: Option<Arc<dyn KeyValueStore>>,
    events: Option<EventBusRef>,
}

impl BrokerBuilder {
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            config,
            directory: None,
            lifecycle: None,
            transport: None,
            resolver: None,
            store: None,
            events: None,
        }
    }

    pub fn directory(mut self, directory: Arc<dyn DirectoryProvider>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn lifecycle(mut self, lifecycle: Arc<dyn AppLifecycle>) -> Self {
        self.lifecycle = Some(lifecycle);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn resolver(mut self, resolver: Arc<dyn ResolverUi>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn event_bus(mut self, events: EventBusRef) -> Self {
        self.events = Some(events);
        self
    }

    /// Validate the config and start the resolver driver. Must be called
    /// inside a tokio runtime.
    pub fn build(self) -> Result<Broker, ConfigError> {
        self.config.validate()?;

        let cancel = CancellationToken::new();
        let resolver = ResolverQueue::spawn(
            self.resolver.unwrap_or_else(|| Arc::new(CancellingResolver)),
            cancel.child_token(),
        );
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryStore::new()));

        tracing::info!(
            system_channels = self.config.system_channels.len(),
            maturity_ms = self.config.maturity_ms,
            "Broker started"
        );

        Ok(Broker {
            state: Mutex::new(BrokerState {
                registry: Registry::new(self.config.maturity()),
                channels: ChannelEngine::new(&self.config.system_channels),
            }),
            changed: Notify::new(),
            preferences: PreferenceStore::new(store, self.config.preference_write_attempts),
            directory: self
                .directory
                .unwrap_or_else(|| Arc::new(StaticDirectory::default())),
            lifecycle: self.lifecycle.unwrap_or_else(|| Arc::new(NullLifecycle)),
            transport: self.transport.unwrap_or_else(|| Arc::new(NullTransport)),
            events: self.events.unwrap_or_else(|| Arc::new(NullEventBus)),
            resolver,
            config: self.config,
            cancel,
        })
    }
}

impl Broker {
    pub fn builder(config: BrokerConfig) -> BrokerBuilder {
        BrokerBuilder::new(config)
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    // --- Registry ---

    /// Register a window. `app_id` names its directory application; windows
    /// without one (or with an unknown one) form an ad-hoc app keyed by
    /// their uuid. Reconnecting a known identity replaces the old
    /// connection.
    pub async fn connect(&self, identity: Identity, app_id: Option<&str>) -> BrokerResult<()> {
        identity.validate()?;
        let app_info = match app_id {
            Some(app_id) => {
                let directory = self.directory.snapshot().await?;
                let app = directory.by_app_id(app_id).cloned();
                if app.is_none() {
                    tracing::warn!(window = %identity, app_id, "Unknown app id, treating window as ad-hoc");
                }
                app
            }
            None => None,
        };

        let (replaced, transition, connected) = {
            let mut state = self.state.lock().await;
            let replaced = if state.registry.contains(&identity) {
                Some(disconnect_locked(&mut state, &identity)?)
            } else {
                None
            };

            let connection = state
                .registry
                .connect(identity.clone(), app_info, Instant::now());
            let connected = WindowConnectedEvent {
                identity: identity.clone(),
                app_id: connection.app_id.clone(),
                from_directory: connection.app_info.is_some(),
                timestamp_ms: now_ms(),
            };
            let BrokerState { registry, channels } = &mut *state;
            let transition = channels.on_connect(registry, &identity)?;
            (replaced, transition, connected)
        };
        self.changed.notify_waiters();

        if let Some((old, transition)) = replaced {
            tracing::debug!(window = %identity, "Window reconnected, dropped previous connection");
            self.emit_disconnected(&old);
            self.apply(transition).await;
        }
        tracing::info!(window = %identity, app_id = %connected.app_id, "Window connected");
        self.events
            .emit_dto(event_names::WINDOW_CONNECTED, &connected);
        self.apply(transition).await;
        Ok(())
    }

    pub async fn disconnect(&self, identity: &Identity) -> BrokerResult<()> {
        let (connection, transition) = {
            let mut state = self.state.lock().await;
            disconnect_locked(&mut state, identity)?
        };
        self.changed.notify_waiters();

        tracing::info!(window = %identity, "Window disconnected");
        self.emit_disconnected(&connection);
        self.apply(transition).await;
        Ok(())
    }

    pub async fn is_mature(&self, identity: &Identity) -> BrokerResult<bool> {
        self.state
            .lock()
            .await
            .registry
            .is_mature(identity, Instant::now())
    }

    pub async fn get_app(&self, app_id: &str) -> Option<AppRecord> {
        self.state.lock().await.registry.get_app(app_id).cloned()
    }

    /// Windows with a live listener for `intent`.
    pub async fn connections_for_intent(&self, intent: &str) -> Vec<Identity> {
        self.state
            .lock()
            .await
            .registry
            .connections_for_intent(intent)
            .into_iter()
            .map(|c| c.identity.clone())
            .collect()
    }

    // --- Listeners ---

    /// Register the window's top-level context listener, which follows its
    /// current channel.
    pub async fn add_context_listener(&self, identity: &Identity) -> BrokerResult<()> {
        self.register(|registry| registry.set_flat_listener(identity, true))
            .await
    }

    pub async fn remove_context_listener(&self, identity: &Identity) -> BrokerResult<()> {
        self.register(|registry| registry.set_flat_listener(identity, false))
            .await
    }

    pub async fn add_channel_context_listener(
        &self,
        identity: &Identity,
        channel: &str,
    ) -> BrokerResult<()> {
        let mut state = self.state.lock().await;
        state.channels.get(channel)?;
        state.registry.add_channel_listener(identity, channel)?;
        Ok(())
    }

    pub async fn remove_channel_context_listener(
        &self,
        identity: &Identity,
        channel: &str,
    ) -> BrokerResult<()> {
        self.state
            .lock()
            .await
            .registry
            .remove_channel_listener(identity, channel)?;
        Ok(())
    }

    pub async fn add_intent_listener(&self, identity: &Identity, intent: &str) -> BrokerResult<()> {
        if intent.trim().is_empty() {
            return Err(BrokerError::invalid("intent", "must not be empty"));
        }
        self.register(|registry| registry.add_intent_listener(identity, intent))
            .await?;
        tracing::debug!(window = %identity, intent, "Intent listener added");
        Ok(())
    }

    pub async fn remove_intent_listener(&self, identity: &Identity, intent: &str) -> BrokerResult<()> {
        self.register(|registry| registry.remove_intent_listener(identity, intent))
            .await
    }

    pub async fn add_event_listener(&self, identity: &Identity, event: EventType) -> BrokerResult<()> {
        self.register(|registry| registry.add_event_listener(identity, event))
            .await
    }

    pub async fn remove_event_listener(
        &self,
        identity: &Identity,
        event: EventType,
    ) -> BrokerResult<()> {
        self.register(|registry| registry.remove_event_listener(identity, event))
            .await
    }

    pub async fn add_channel_event_listener(
        &self,
        identity: &Identity,
        channel: &str,
        event: ChannelEventType,
    ) -> BrokerResult<()> {
        let mut state = self.state.lock().await;
        state.channels.get(channel)?;
        state
            .registry
            .add_channel_event_listener(identity, channel, event)?;
        Ok(())
    }

    pub async fn remove_channel_event_listener(
        &self,
        identity: &Identity,
        channel: &str,
        event: ChannelEventType,
    ) -> BrokerResult<()> {
        self.state
            .lock()
            .await
            .registry
            .remove_channel_event_listener(identity, channel, event)?;
        Ok(())
    }

    // --- Channels ---

    pub async fn get_channel_by_id(&self, id: &str) -> BrokerResult<ChannelInfo> {
        Ok(self.state.lock().await.channels.get(id)?.info())
    }

    pub async fn get_system_channels(&self) -> Vec<ChannelInfo> {
        self.state.lock().await.channels.system_channels()
    }

    pub async fn get_or_create_app_channel(&self, name: &str) -> BrokerResult<ChannelInfo> {
        self.state
            .lock()
            .await
            .channels
            .get_or_create_app_channel(name)
    }

    pub async fn get_current_channel(&self, identity: &Identity) -> BrokerResult<ChannelInfo> {
        let state = self.state.lock().await;
        let channel = &state.registry.get(identity)?.channel;
        Ok(state.channels.get(channel)?.info())
    }

    pub async fn join_channel(&self, identity: &Identity, channel: &str) -> BrokerResult<()> {
        let transition = {
            let mut state = self.state.lock().await;
            let BrokerState { registry, channels } = &mut *state;
            channels.join(registry, identity, channel)?
        };
        self.apply(transition).await;
        Ok(())
    }

    /// Return to the default channel.
    pub async fn leave_channel(&self, identity: &Identity) -> BrokerResult<()> {
        self.join_channel(identity, DEFAULT_CHANNEL_ID).await
    }

    /// Broadcast on the sender's current channel.
    pub async fn broadcast(&self, from: &Identity, context: Value) -> BrokerResult<()> {
        let context = Context::new(context)?;
        self.broadcast_on(from, None, context).await
    }

    /// Broadcast on an explicit channel, joined or not.
    pub async fn channel_broadcast(
        &self,
        from: &Identity,
        channel: &str,
        context: Value,
    ) -> BrokerResult<()> {
        let context = Context::new(context)?;
        self.broadcast_on(from, Some(channel), context).await
    }

    pub async fn get_members(&self, channel: &str) -> BrokerResult<Vec<Identity>> {
        self.state.lock().await.channels.members(channel)
    }

    pub async fn get_current_context(&self, channel: &str) -> BrokerResult<Option<Context>> {
        self.state.lock().await.channels.current_context(channel)
    }

    // --- Intents ---

    pub async fn find_intent(
        &self,
        intent: &str,
        context: Option<Value>,
    ) -> BrokerResult<AppIntentGroup> {
        let context = context.map(Context::new).transpose()?;
        let directory = self.directory.snapshot().await?;
        let state = self.state.lock().await;
        intents::find_intent(
            &state.registry,
            &directory,
            intent,
            context.as_ref().map(Context::context_type),
        )
    }

    pub async fn find_intents_by_context(&self, context: Value) -> BrokerResult<Vec<AppIntentGroup>> {
        let context = Context::new(context)?;
        let directory = self.directory.snapshot().await?;
        let state = self.state.lock().await;
        Ok(intents::find_intents_by_context(
            &state.registry,
            &directory,
            context.context_type(),
        ))
    }

    /// Store a default target for `intent`, for one source app or globally.
    pub async fn set_intent_preference(
        &self,
        intent: &str,
        source_app: Option<&str>,
        app_id: &str,
    ) -> BrokerResult<()> {
        if intent.trim().is_empty() || app_id.trim().is_empty() {
            return Err(BrokerError::invalid("preference", "intent and app id are required"));
        }
        let (intent, source_app, app_id) = (
            intent.to_string(),
            source_app.map(str::to_string),
            app_id.to_string(),
        );
        self.with_preferences(move |prefs| {
            prefs.set_preference(&intent, source_app.as_deref(), &app_id)
        })
        .await
    }

    pub async fn clear_intent_preference(
        &self,
        intent: &str,
        source_app: Option<&str>,
    ) -> BrokerResult<bool> {
        let (intent, source_app) = (intent.to_string(), source_app.map(str::to_string));
        self.with_preferences(move |prefs| prefs.clear_preference(&intent, source_app.as_deref()))
            .await
    }

    /// Run a preference read or write on the blocking pool. The store may
    /// be SQLite-backed.
    pub(crate) async fn with_preferences<T, F>(&self, op: F) -> BrokerResult<T>
    where
        F: FnOnce(&PreferenceStore) -> switchboard_storage::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let prefs = self.preferences.clone();
        Ok(tokio::task::spawn_blocking(move || op(&prefs)).await??)
    }

    /// Resolver requests queued or on screen.
    pub fn pending_resolutions(&self) -> usize {
        self.resolver.pending()
    }

    /// Stop the resolver driver. Queued resolutions fail with
    /// [`BrokerError::ShuttingDown`].
    pub fn shutdown(&self) {
        tracing::info!("Broker shutting down");
        self.cancel.cancel();
    }

    // --- Internals ---

    pub(crate) async fn directory_snapshot(&self) -> BrokerResult<AppDirectory> {
        Ok(self.directory.snapshot().await?)
    }

    /// Apply a listener registration and wake handshake waits.
    async fn register<F>(&self, apply: F) -> BrokerResult<()>
    where
        F: FnOnce(&mut Registry) -> BrokerResult<bool>,
    {
        let changed = apply(&mut self.state.lock().await.registry)?;
        if changed {
            self.changed.notify_waiters();
        }
        Ok(())
    }

    /// Channel lookup and broadcast share one critical section so a
    /// concurrent join cannot move the sender in between.
    async fn broadcast_on(
        &self,
        from: &Identity,
        channel: Option<&str>,
        context: Context,
    ) -> BrokerResult<()> {
        let outcome = {
            let mut state = self.state.lock().await;
            let BrokerState { registry, channels } = &mut *state;
            channels.broadcast(registry, from, channel, &context)?
        };

        tracing::debug!(
            window = %from,
            channel = %outcome.channel,
            context_type = context.context_type(),
            recipients = outcome.effects.len(),
            "Context broadcast"
        );
        self.events.emit_dto(
            event_names::CONTEXT_BROADCAST,
            &ContextBroadcastEvent {
                source: from.clone(),
                channel: outcome.channel.clone(),
                context_type: context.context_type().to_string(),
                recipients: outcome.effects.len(),
                cached: outcome.cached,
            },
        );
        self.dispatch(outcome.effects).await;
        Ok(())
    }

    async fn apply(&self, transition: Transition) {
        if let Some(changed) = &transition.changed {
            self.emit_channel_changed(changed);
        }
        self.dispatch(transition.effects).await;
    }

    /// Deliver effects in order. Failures are logged, never returned.
    pub(crate) async fn dispatch(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Context { to, scope, context } => {
                    if let Err(e) = self.transport.deliver_context(&to, &scope, &context).await {
                        tracing::warn!(window = %to, ?scope, error = %e, "Context delivery failed");
                    }
                }
                Effect::Event { to, event } => {
                    if let Err(e) = self.transport.deliver_event(&to, &event).await {
                        tracing::warn!(window = %to, error = %e, "Event delivery failed");
                    }
                }
            }
        }
    }

    fn emit_channel_changed(&self, changed: &ChannelChangedEvent) {
        self.events.emit_dto(event_names::CHANNEL_CHANGED, changed);
    }

    fn emit_disconnected(&self, connection: &Connection) {
        self.events.emit_dto(
            event_names::WINDOW_DISCONNECTED,
            &WindowDisconnectedEvent {
                identity: connection.identity.clone(),
                app_id: connection.app_id.clone(),
                last_channel: connection.channel.clone(),
                timestamp_ms: now_ms(),
            },
        );
    }

    pub(crate) async fn focus(&self, identity: &Identity) {
        if let Err(e) = self.lifecycle.focus(identity).await {
            tracing::warn!(window = %identity, error = %e, "Failed to focus window");
        }
    }
}

impl Drop for Broker {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn disconnect_locked(
    state: &mut BrokerState,
    identity: &Identity,
) -> BrokerResult<(Connection, Transition)> {
    let connection = state.registry.disconnect(identity)?;
    let transition = state.channels.on_disconnect(&state.registry, &connection);
    Ok((connection, transition))
}
