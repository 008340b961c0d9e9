//! Context payloads and window identities for switchboard.
//!
//! Everything that crosses the broker boundary from an application window is
//! validated here, once, before it can reach the broker state machine:
//! - [`Context`] - a JSON object carrying a non-empty string `type`
//! - [`Identity`] - the `{uuid, name}` pair naming one connected window
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                  Boundary types (pure)                    │
//! │  payload.rs  - Context validation and accessors           │
//! │  identity.rs - Identity validation                        │
//! │  types.rs    - Well-known context type names              │
//! └──────────────────────────────────────────────────────────┘
//!                             │
//!                             ▼
//!        switchboard-events / switchboard-broker consume
//! ```
//!
//! # Example
//!
//! ```
//! use switchboard_context::Context;
//! use serde_json::json;
//!
//! let ctx = Context::new(json!({"type": "fdc3.instrument", "id": {"ticker": "AAPL"}})).unwrap();
//! assert_eq!(ctx.context_type(), "fdc3.instrument");
//! ```

mod error;
mod identity;
mod payload;

pub mod types;

pub use error::ContextError;
pub use identity::Identity;
pub use payload::Context;
