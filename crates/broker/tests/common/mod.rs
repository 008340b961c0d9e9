//! Recording collaborators shared by the broker integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use switchboard_broker::{
    AppLifecycle, Broker, BrokerConfig, ContextScope, HandlerOutcome, LifecycleError,
    ResolverOutcome, ResolverRequest, ResolverUi, Transport, TransportError,
};
use switchboard_context::{Context, Identity};
use switchboard_directory::{Application, StaticDirectory};
use switchboard_events::{InMemoryEventBus, WindowEvent};
use switchboard_storage::InMemoryStore;
use tokio::sync::mpsc;

pub fn id(uuid: &str) -> Identity {
    Identity::new(uuid, format!("{uuid}-window")).unwrap()
}

/// Install a test subscriber once; `RUST_LOG` controls the output.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Poll `check` until it holds, yielding to other tasks in between.
pub async fn until<F: Fn() -> bool>(check: F) {
    for _ in 0..10_000 {
        if check() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition never became true");
}

// =============================================================================
// Transport
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Delivered {
    pub to: Identity,
    pub scope: ContextScope,
    pub context: Context,
}

#[derive(Default)]
pub struct RecordingTransport {
    pub contexts: Mutex<Vec<Delivered>>,
    pub events: Mutex<Vec<(Identity, WindowEvent)>>,
    pub intents: Mutex<Vec<(Identity, String)>>,
    replies: Mutex<HashMap<String, Vec<HandlerOutcome>>>,
    unreachable: Mutex<Vec<String>>,
}

impl RecordingTransport {
    /// Outcomes a window's intent handlers produce. Windows without a
    /// scripted reply run one void handler.
    pub fn reply(&self, uuid: &str, outcomes: Vec<HandlerOutcome>) {
        self.replies
            .lock()
            .unwrap()
            .insert(uuid.to_string(), outcomes);
    }

    pub fn make_unreachable(&self, uuid: &str) {
        self.unreachable.lock().unwrap().push(uuid.to_string());
    }

    pub fn contexts_for(&self, uuid: &str) -> Vec<Delivered> {
        self.contexts
            .lock()
            .unwrap()
            .iter()
            .filter(|d| d.to.uuid == uuid)
            .cloned()
            .collect()
    }

    pub fn events_for(&self, uuid: &str) -> Vec<WindowEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(to, _)| to.uuid == uuid)
            .map(|(_, e)| e.clone())
            .collect()
    }

    pub fn intents_for(&self, uuid: &str) -> Vec<String> {
        self.intents
            .lock()
            .unwrap()
            .iter()
            .filter(|(to, _)| to.uuid == uuid)
            .map(|(_, i)| i.clone())
            .collect()
    }

    fn check_reachable(&self, to: &Identity) -> Result<(), TransportError> {
        if self.unreachable.lock().unwrap().contains(&to.uuid) {
            return Err(TransportError::Unreachable(to.clone()));
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn deliver_context(
        &self,
        to: &Identity,
        scope: &ContextScope,
        context: &Context,
    ) -> Result<(), TransportError> {
        self.check_reachable(to)?;
        self.contexts.lock().unwrap().push(Delivered {
            to: to.clone(),
            scope: scope.clone(),
            context: context.clone(),
        });
        Ok(())
    }

    async fn deliver_event(&self, to: &Identity, event: &WindowEvent) -> Result<(), TransportError> {
        self.check_reachable(to)?;
        self.events.lock().unwrap().push((to.clone(), event.clone()));
        Ok(())
    }

    async fn deliver_intent(
        &self,
        to: &Identity,
        intent: &str,
        _context: &Context,
    ) -> Result<Vec<HandlerOutcome>, TransportError> {
        self.check_reachable(to)?;
        self.intents
            .lock()
            .unwrap()
            .push((to.clone(), intent.to_string()));
        Ok(self
            .replies
            .lock()
            .unwrap()
            .get(&to.uuid)
            .cloned()
            .unwrap_or_else(|| vec![Ok(None)]))
    }
}

// =============================================================================
// Lifecycle
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchMode {
    Succeed,
    Fail,
    Hang,
}

pub struct ScriptedLifecycle {
    pub launched: Mutex<Vec<String>>,
    pub focused: Mutex<Vec<Identity>>,
    mode: Mutex<LaunchMode>,
    running: Mutex<Vec<String>>,
}

impl ScriptedLifecycle {
    pub fn new() -> Self {
        Self {
            launched: Mutex::new(Vec::new()),
            focused: Mutex::new(Vec::new()),
            mode: Mutex::new(LaunchMode::Succeed),
            running: Mutex::new(Vec::new()),
        }
    }

    pub fn set_mode(&self, mode: LaunchMode) {
        *self.mode.lock().unwrap() = mode;
    }

    /// Report an app as running even though none of its windows connected.
    pub fn mark_running(&self, app_id: &str) {
        self.running.lock().unwrap().push(app_id.to_string());
    }

    pub fn launches(&self) -> Vec<String> {
        self.launched.lock().unwrap().clone()
    }

    pub fn focused(&self) -> Vec<Identity> {
        self.focused.lock().unwrap().clone()
    }
}

#[async_trait]
impl AppLifecycle for ScriptedLifecycle {
    async fn launch(&self, app: &Application) -> Result<(), LifecycleError> {
        self.launched.lock().unwrap().push(app.app_id.clone());
        let mode = *self.mode.lock().unwrap();
        match mode {
            LaunchMode::Succeed => Ok(()),
            LaunchMode::Fail => Err(LifecycleError("manifest missing".into())),
            LaunchMode::Hang => {
                tokio::time::sleep(Duration::from_secs(3_600)).await;
                Ok(())
            }
        }
    }

    async fn is_running(&self, app: &Application) -> bool {
        self.running.lock().unwrap().contains(&app.app_id)
    }

    async fn focus(&self, identity: &Identity) -> Result<(), LifecycleError> {
        self.focused.lock().unwrap().push(identity.clone());
        Ok(())
    }
}

// =============================================================================
// Resolver UI
// =============================================================================

/// Resolver that records what it shows and waits for the test to answer.
pub struct ScriptedResolver {
    pub shown: Mutex<Vec<ResolverRequest>>,
    answers_tx: mpsc::UnboundedSender<ResolverOutcome>,
    answers_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<ResolverOutcome>>,
}

impl ScriptedResolver {
    pub fn new() -> Self {
        let (answers_tx, answers_rx) = mpsc::unbounded_channel();
        Self {
            shown: Mutex::new(Vec::new()),
            answers_tx,
            answers_rx: tokio::sync::Mutex::new(answers_rx),
        }
    }

    pub fn answer(&self, outcome: ResolverOutcome) {
        let _ = self.answers_tx.send(outcome);
    }

    pub fn select(&self, app_id: &str) {
        self.answer(ResolverOutcome::Selected {
            app_id: app_id.to_string(),
            remember: false,
        });
    }

    pub fn shown_intents(&self) -> Vec<String> {
        self.shown
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.intent.clone())
            .collect()
    }

    pub fn shown_count(&self) -> usize {
        self.shown.lock().unwrap().len()
    }
}

#[async_trait]
impl ResolverUi for ScriptedResolver {
    async fn resolve(&self, request: &ResolverRequest) -> ResolverOutcome {
        self.shown.lock().unwrap().push(request.clone());
        let mut answers = self.answers_rx.lock().await;
        answers.recv().await.unwrap_or(ResolverOutcome::Cancelled)
    }
}

// =============================================================================
// Harness
// =============================================================================

pub struct Harness {
    pub broker: Arc<Broker>,
    pub transport: Arc<RecordingTransport>,
    pub lifecycle: Arc<ScriptedLifecycle>,
    pub resolver: Arc<ScriptedResolver>,
    pub events: Arc<InMemoryEventBus>,
    pub store: Arc<InMemoryStore>,
}

impl Harness {
    pub fn new(apps: Vec<Application>) -> Self {
        Self::with_config(apps, BrokerConfig::default())
    }

    pub fn with_config(apps: Vec<Application>, config: BrokerConfig) -> Self {
        init_tracing();
        let transport = Arc::new(RecordingTransport::default());
        let lifecycle = Arc::new(ScriptedLifecycle::new());
        let resolver = Arc::new(ScriptedResolver::new());
        let events = Arc::new(InMemoryEventBus::new());
        let store = Arc::new(InMemoryStore::new());

        let broker = Broker::builder(config)
            .directory(Arc::new(StaticDirectory::new(apps)))
            .transport(transport.clone())
            .lifecycle(lifecycle.clone())
            .resolver(resolver.clone())
            .event_bus(events.clone())
            .store(store.clone())
            .build()
            .unwrap();

        Self {
            broker: Arc::new(broker),
            transport,
            lifecycle,
            resolver,
            events,
            store,
        }
    }

    /// Connect a window of a directory app (or an ad-hoc one).
    pub async fn connect(&self, uuid: &str, app_id: Option<&str>) -> Identity {
        let identity = id(uuid);
        self.broker.connect(identity.clone(), app_id).await.unwrap();
        identity
    }

    /// Connect a window that already listens for `intent`.
    pub async fn connect_handler(&self, uuid: &str, app_id: Option<&str>, intent: &str) -> Identity {
        let identity = self.connect(uuid, app_id).await;
        self.broker
            .add_intent_listener(&identity, intent)
            .await
            .unwrap();
        identity
    }
}

pub fn ctx(value: Value) -> Context {
    Context::new(value).unwrap()
}
