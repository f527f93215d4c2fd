//! Key-value store trait and its SQLite, in-memory and no-op backends.

use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::StoreError;

/// Durable string key-value store.
///
/// A missing key is `Ok(None)`, never an error. Failures of the backing store
/// come back as `StoreError`; callers treat them as "snapshot unavailable".
pub trait KeyValueStore: Send + Sync {
  fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

  fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

  /// Removing a key that does not exist succeeds.
  fn remove(&self, key: &str) -> Result<(), StoreError>;
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for std::sync::Arc<S> {
  fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
    (**self).get(key)
  }

  fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
    (**self).set(key, value)
  }

  fn remove(&self, key: &str) -> Result<(), StoreError> {
    (**self).remove(key)
  }
}

impl KeyValueStore for Box<dyn KeyValueStore> {
  fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
    (**self).get(key)
  }

  fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
    (**self).set(key, value)
  }

  fn remove(&self, key: &str) -> Result<(), StoreError> {
    (**self).remove(key)
  }
}

/// Storage implementation that doesn't cache anything.
/// Used when caching is disabled - all operations are no-ops.
pub struct NoopStore;

impl KeyValueStore for NoopStore {
  fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
    Ok(None) // Always miss
  }

  fn set(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
    Ok(()) // Discard
  }

  fn remove(&self, _key: &str) -> Result<(), StoreError> {
    Ok(())
  }
}

/// Process-local store, optionally bounded by a total byte budget.
#[derive(Default)]
pub struct MemoryStore {
  entries: Mutex<HashMap<String, String>>,
  capacity: Option<usize>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Reject writes once keys plus values would exceed `bytes`.
  pub fn with_capacity(bytes: usize) -> Self {
    Self {
      entries: Mutex::new(HashMap::new()),
      capacity: Some(bytes),
    }
  }

  pub fn len(&self) -> usize {
    self.entries.lock().map(|e| e.len()).unwrap_or(0)
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl KeyValueStore for MemoryStore {
  fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
    let entries = self.entries.lock().map_err(|_| StoreError::LockPoisoned)?;
    Ok(entries.get(key).cloned())
  }

  fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
    let mut entries = self.entries.lock().map_err(|_| StoreError::LockPoisoned)?;

    if let Some(capacity) = self.capacity {
      let used: usize = entries
        .iter()
        .filter(|(k, _)| k.as_str() != key)
        .map(|(k, v)| k.len() + v.len())
        .sum();
      let needed = key.len() + value.len();
      if used + needed > capacity {
        return Err(StoreError::CapacityExceeded {
          key: key.to_string(),
          needed,
          available: capacity.saturating_sub(used),
        });
      }
    }

    entries.insert(key.to_string(), value.to_string());
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<(), StoreError> {
    let mut entries = self.entries.lock().map_err(|_| StoreError::LockPoisoned)?;
    entries.remove(key);
    Ok(())
  }
}

/// SQLite-based store implementation.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open the store at the default location.
  pub fn open() -> Result<Self, StoreError> {
    let path = Self::default_path()?;
    Self::open_at(&path)
  }

  /// Open (or create) the store at an explicit path.
  pub fn open_at(path: &Path) -> Result<Self, StoreError> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
        message: format!("failed to create cache directory: {}", e),
      })?;
    }

    let conn = Connection::open(path).map_err(|e| StoreError::Backend {
      message: format!("failed to open cache database at {}: {}", path.display(), e),
    })?;

    Self::with_connection(conn)
  }

  pub fn open_in_memory() -> Result<Self, StoreError> {
    Self::with_connection(Connection::open_in_memory()?)
  }

  fn with_connection(conn: Connection) -> Result<Self, StoreError> {
    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;
    Ok(store)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf, StoreError> {
    let data_dir = crate::config::data_dir().ok_or_else(|| StoreError::Backend {
      message: "could not determine data directory".to_string(),
    })?;

    Ok(data_dir.join("cache.db"))
  }

  fn run_migrations(&self) -> Result<(), StoreError> {
    let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
    conn.execute_batch(STORE_SCHEMA)?;
    Ok(())
  }
}

/// Schema for the key-value table.
const STORE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv_store (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

impl KeyValueStore for SqliteStore {
  fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
    let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;

    let value = conn
      .query_row(
        "SELECT value FROM kv_store WHERE key = ?",
        params![key],
        |row| row.get(0),
      )
      .optional()?;

    Ok(value)
  }

  fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
    let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;

    conn.execute(
      "INSERT OR REPLACE INTO kv_store (key, value, updated_at)
       VALUES (?, ?, datetime('now'))",
      params![key, value],
    )?;

    Ok(())
  }

  fn remove(&self, key: &str) -> Result<(), StoreError> {
    let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
    conn.execute("DELETE FROM kv_store WHERE key = ?", params![key])?;
    Ok(())
  }
}
