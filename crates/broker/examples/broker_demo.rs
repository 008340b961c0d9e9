//! Example: drive a broker with in-process windows.
//!
//! Run with: cargo run -p switchboard-broker --example broker_demo
//!
//! Set `RUST_LOG` to change verbosity (default `info,switchboard=debug`).

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use switchboard_broker::{
    AppLifecycle, Broker, BrokerConfig, ContextScope, HandlerOutcome, LifecycleError, Transport,
    TransportError,
};
use switchboard_context::{types, Context, Identity};
use switchboard_directory::{Application, DirectoryShard, DirectoryStore};
use switchboard_events::WindowEvent;
use switchboard_storage::Database;
use tracing_subscriber::EnvFilter;

/// Prints every delivery instead of crossing a process boundary.
struct PrintingTransport;

#[async_trait]
impl Transport for PrintingTransport {
    async fn deliver_context(
        &self,
        to: &Identity,
        scope: &ContextScope,
        context: &Context,
    ) -> Result<(), TransportError> {
        println!("  -> {to} ({scope:?}) context {}", context.as_value());
        Ok(())
    }

    async fn deliver_event(&self, to: &Identity, event: &WindowEvent) -> Result<(), TransportError> {
        println!("  -> {to} event {}", serde_json::to_string(event).unwrap_or_default());
        Ok(())
    }

    async fn deliver_intent(
        &self,
        to: &Identity,
        intent: &str,
        context: &Context,
    ) -> Result<Vec<HandlerOutcome>, TransportError> {
        println!("  -> {to} intent {intent} with {}", context.context_type());
        Ok(vec![Ok(Some(json!({ "handledBy": to.name })))])
    }
}

struct PrintingLifecycle;

#[async_trait]
impl AppLifecycle for PrintingLifecycle {
    async fn launch(&self, app: &Application) -> Result<(), LifecycleError> {
        println!("  (launch {} from {})", app.name, app.manifest);
        Ok(())
    }

    async fn is_running(&self, _app: &Application) -> bool {
        false
    }

    async fn focus(&self, identity: &Identity) -> Result<(), LifecycleError> {
        println!("  (focus {identity})");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,switchboard=debug")),
        )
        .init();

    println!("=== Switchboard broker demo ===\n");

    let db: Arc<Database> = Arc::new(Database::open_in_memory()?);
    let directory = DirectoryStore::new(db.clone());
    directory.upsert_shard(DirectoryShard {
        source: "demo".to_string(),
        applications: vec![
            Application::new("blotter", "Blotter"),
            Application::new("charts", "Charts")
                .with_manifest("https://apps.example/charts.json")
                .with_intent("ViewChart", &[types::INSTRUMENT]),
        ],
    })?;

    let broker = Broker::builder(BrokerConfig::default())
        .directory(Arc::new(directory))
        .store(db)
        .transport(Arc::new(PrintingTransport))
        .lifecycle(Arc::new(PrintingLifecycle))
        .build()?;

    let blotter = Identity::new("b-1", "blotter-main")?;
    let charts = Identity::new("c-1", "charts-main")?;
    broker.connect(blotter.clone(), Some("blotter")).await?;
    broker.connect(charts.clone(), Some("charts")).await?;
    broker.add_context_listener(&charts).await?;
    broker.add_intent_listener(&charts, "ViewChart").await?;

    println!("\nBoth windows join red:");
    broker.join_channel(&blotter, "red").await?;
    broker.join_channel(&charts, "red").await?;

    let apple = json!({"type": types::INSTRUMENT, "name": "Apple", "id": {"ticker": "AAPL"}});
    println!("\nBlotter broadcasts on red:");
    broker.broadcast(&blotter, apple.clone()).await?;

    println!("\nBlotter raises ViewChart:");
    let resolution = broker.raise_intent(&blotter, "ViewChart", apple, None).await?;
    println!("  resolved by {} -> {:?}", resolution.source, resolution.data);

    broker.shutdown();
    println!("\nDone.");
    Ok(())
}
