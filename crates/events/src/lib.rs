//! Shared event contracts for the interop broker.
//!
//! Two audiences consume broker events:
//! - application windows, which receive [`WindowEvent`]s through the
//!   transport when they registered a listener for them
//! - the host shell (channel selector, diagnostics), which observes every
//!   broker transition through an [`EventBus`]
//!
//! Using shared types prevents runtime deserialization errors from
//! mismatched field names on either side.

mod bus;
mod window;

pub use bus::{EmittedEvent, EventBus, EventBusRef, InMemoryEventBus, NullEventBus};
pub use window::{ChannelEventType, EventType, WindowEvent};

use serde::{Deserialize, Serialize};
use switchboard_context::Identity;

/// A window completed its handshake with the broker.
///
/// Producers: broker registry
/// Consumers: host shell
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConnectedEvent {
    pub identity: Identity,
    /// Directory app id, or the launch uuid for ad-hoc apps.
    pub app_id: String,
    /// Whether the window belongs to a directory application.
    #[serde(default)]
    pub from_directory: bool,
    #[serde(default)]
    pub timestamp_ms: i64,
}

/// A window went away (closed, navigated or reloaded).
///
/// Producers: broker registry
/// Consumers: host shell
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowDisconnectedEvent {
    pub identity: Identity,
    pub app_id: String,
    /// Channel the window occupied when it disconnected.
    pub last_channel: String,
    #[serde(default)]
    pub timestamp_ms: i64,
}

/// A window moved between channels.
///
/// Producers: broker channel engine
/// Consumers: host shell (channel selector)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelChangedEvent {
    pub identity: Identity,
    /// New channel, `None` when the window disconnected.
    pub channel: Option<String>,
    /// Previous channel, `None` for a freshly connected window.
    pub previous_channel: Option<String>,
}

/// A context was broadcast on a channel.
///
/// Producers: broker channel engine
/// Consumers: host shell
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextBroadcastEvent {
    pub source: Identity,
    pub channel: String,
    pub context_type: String,
    /// Number of listener deliveries the broadcast produced.
    pub recipients: usize,
    /// Whether the channel cached the context.
    pub cached: bool,
}

/// An intent reached its handler (or failed to).
///
/// Producers: broker intent pipeline
/// Consumers: host shell
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentResolvedEvent {
    pub intent: String,
    pub context_type: String,
    /// App that handled the intent, when one was selected.
    #[serde(default)]
    pub target: Option<String>,
    /// Error message when resolution failed.
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub timestamp_ms: i64,
}

/// Event names as constants to prevent typos.
pub mod event_names {
    /// Window connected to the broker.
    pub const WINDOW_CONNECTED: &str = "registry:window_connected";
    /// Window disconnected from the broker.
    pub const WINDOW_DISCONNECTED: &str = "registry:window_disconnected";
    /// Window changed channel.
    pub const CHANNEL_CHANGED: &str = "channels:channel_changed";
    /// Context broadcast on a channel.
    pub const CONTEXT_BROADCAST: &str = "channels:context_broadcast";
    /// Intent resolution finished.
    pub const INTENT_RESOLVED: &str = "intents:resolved";
}

/// Milliseconds since the Unix epoch, for event timestamps.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
