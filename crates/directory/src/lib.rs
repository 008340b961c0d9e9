//! Application directory for the interop broker.
//!
//! - `types.rs` - directory entries ([`Application`], [`AppIntent`])
//! - `matcher.rs` - pure predicates deciding which apps can handle an intent
//! - `directory.rs` - immutable snapshots and the [`DirectoryProvider`] trait
//! - `store.rs` - persisted directory shards with optimistic concurrency

mod directory;
mod error;
mod store;
mod types;

pub mod matcher;

pub use directory::{AppDirectory, DirectoryProvider, StaticDirectory};
pub use error::{DirectoryError, DirectoryResult};
pub use matcher::{declares_intent, intents_for_context, might_support, should_support};
pub use store::{DirectoryShard, DirectoryStore, DIRECTORY_KEY, DIRECTORY_VERSION, LEGACY_SHARD};
pub use types::{AppIntent, Application};
