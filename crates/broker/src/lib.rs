//! Interop broker core.
//!
//! Tracks which application windows are connected, moves context between
//! them over channels, and routes intents to the app that should handle
//! them.
//!
//! ```text
//!  window ops ──► Broker ──────────────────────────────────────────┐
//!                   │  lock                                        │ after unlock
//!                   ▼                                              ▼
//!        ┌─────────────────────┐   Effects    ┌──────────────────────────┐
//!        │ Registry            │ ───────────► │ Transport (windows)      │
//!        │ ChannelEngine       │              └──────────────────────────┘
//!        └─────────────────────┘
//!                   │ raise_intent
//!                   ▼
//!   candidates ─► preference ─► ResolverQueue ─► AppLifecycle ─► aggregate
//!                   │
//!                   └──► EventBus (host shell)
//! ```
//!
//! Collaborators ([`AppLifecycle`], [`Transport`], [`ResolverUi`]) are
//! traits with null implementations, so a broker can be built and driven
//! with none of them attached:
//!
//! ```no_run
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! use switchboard_broker::{Broker, BrokerConfig};
//! use switchboard_context::Identity;
//!
//! let broker = Broker::builder(BrokerConfig::default()).build()?;
//! let window = Identity::new("3f2a", "blotter")?;
//! broker.connect(window.clone(), None).await?;
//! broker.join_channel(&window, "red").await?;
//! # Ok(())
//! # }
//! ```

mod broker;
pub mod channels;
pub mod config;
mod error;
pub mod intents;
pub mod preferences;
pub mod provider;
pub mod registry;

pub use broker::{Broker, BrokerBuilder};
pub use channels::{ChannelInfo, ChannelKind, DEFAULT_CHANNEL_ID};
pub use config::{BrokerConfig, ConfigError, SystemChannelConfig};
pub use error::{BrokerError, BrokerResult, ErrorKind};
pub use intents::{AppIntentGroup, IntentCandidate, IntentMetadata, IntentResolution};
pub use preferences::{IntentPreferences, PreferenceStore};
pub use provider::{
    AppLifecycle, CancellingResolver, ContextScope, HandlerOutcome, LifecycleError, NullLifecycle,
    NullTransport, ResolverOutcome, ResolverRequest, ResolverUi, Transport, TransportError,
};
pub use registry::{AppRecord, Connection};
