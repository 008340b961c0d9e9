//! Key-value persistence for directory shards and user preferences.
//!
//! Writers that share a key use [`update_with_retry`]: read the current
//! value, derive the next one, and write it back only if nobody else wrote
//! in between.

use rusqlite::{Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("key '{key}' kept changing, gave up after {attempts} attempts")]
    Contention { key: String, attempts: usize },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no data directory available on this platform")]
    NoDataDir,
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Default number of read-modify-write attempts before giving up.
pub const DEFAULT_WRITE_ATTEMPTS: usize = 5;

/// String key-value store with a compare-and-swap write.
pub trait KeyValueStore: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>>;

    fn set_item(&self, key: &str, value: &str) -> Result<()>;

    /// Write `value` only if the stored value still equals `expected`
    /// (`None` meaning "absent"). Returns whether the write happened.
    fn set_if_unchanged(&self, key: &str, expected: Option<&str>, value: &str) -> Result<bool>;
}

/// Optimistic read-modify-write loop.
///
/// `mutate` receives the current value and returns the value to store. It
/// may run more than once, so it must not have side effects.
pub fn update_with_retry<F>(
    store: &dyn KeyValueStore,
    key: &str,
    max_attempts: usize,
    mut mutate: F,
) -> Result<String>
where
    F: FnMut(Option<&str>) -> Result<String>,
{
    let attempts = max_attempts.max(1);
    for attempt in 1..=attempts {
        let current = store.get_item(key)?;
        let next = mutate(current.as_deref())?;
        if store.set_if_unchanged(key, current.as_deref(), &next)? {
            return Ok(next);
        }
        tracing::debug!(key, attempt, "Concurrent write detected, retrying");
    }

    tracing::warn!(key, attempts, "Giving up on contended key");
    Err(StorageError::Contention {
        key: key.to_string(),
        attempts,
    })
}

/// Process-local store, for tests and embedding without a database.
#[derive(Default)]
pub struct InMemoryStore {
    items: Mutex<HashMap<String, String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for InMemoryStore {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        let items = self.items.lock().expect("store mutex poisoned");
        Ok(items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let mut items = self.items.lock().expect("store mutex poisoned");
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn set_if_unchanged(&self, key: &str, expected: Option<&str>, value: &str) -> Result<bool> {
        let mut items = self.items.lock().expect("store mutex poisoned");
        if items.get(key).map(String::as_str) != expected {
            return Ok(false);
        }
        items.insert(key.to_string(), value.to_string());
        Ok(true)
    }
}

/// SQLite-backed store using a single `settings` table.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        Ok(db)
    }

    /// Open the database at [`default_db_path`], creating its directory.
    pub fn open_default() -> Result<Self> {
        let path = default_db_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        tracing::info!(path = %path.display(), "Opening broker store");
        Self::open(&path)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().expect("database mutex poisoned");
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }
}

fn read_value(conn: &Connection, key: &str) -> Result<Option<String>> {
    let value = conn
        .query_row("SELECT value FROM settings WHERE key = ?1", [key], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(value)
}

impl KeyValueStore for Database {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().expect("database mutex poisoned");
        read_value(&conn, key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock().expect("database mutex poisoned");
        conn.execute(
            "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
            (key, value),
        )?;
        Ok(())
    }

    fn set_if_unchanged(&self, key: &str, expected: Option<&str>, value: &str) -> Result<bool> {
        let mut conn = self.conn.lock().expect("database mutex poisoned");
        let tx = conn.transaction()?;
        if read_value(&tx, key)?.as_deref() != expected {
            return Ok(false);
        }
        tx.execute(
            "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
            (key, value),
        )?;
        tx.commit()?;
        Ok(true)
    }
}

/// `<data dir>/switchboard/broker.db`.
pub fn default_db_path() -> Result<PathBuf> {
    let base = dirs::data_dir().ok_or(StorageError::NoDataDir)?;
    Ok(base.join("switchboard").join("broker.db"))
}
