//! Persistent key/value store with per-key write locks
//!
//! Values are JSON-encoded and kept in SQLite. Read-modify-write sequences
//! take [`Store::write_lock`] for their key before reading and hold the
//! returned guard until the write has completed.

pub mod db;

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::trace;

pub use db::{Database, DatabaseError};

/// Errors that can occur in the store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Failed to encode or decode value for key {key}: {source}")]
    Json {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to acquire lock")]
    LockError,
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Guard for an exclusive write section on a single key
///
/// The lock is released when the guard is dropped, including on early
/// returns and errors inside the critical section.
pub struct KeyLock {
    key: String,
    _guard: OwnedMutexGuard<()>,
}

impl KeyLock {
    /// The key this guard holds
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for KeyLock {
    fn drop(&mut self) {
        trace!(key = %self.key, "Released write lock");
    }
}

/// Typed JSON key/value store
pub struct Store {
    /// Database handle (std Mutex for rusqlite compatibility)
    db: Mutex<Database>,
    /// One async lock per key, created on first use
    key_locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl Store {
    /// Wrap an open database
    pub fn new(db: Database) -> Self {
        Self {
            db: Mutex::new(db),
            key_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Open or create a store backed by the database at `path`
    pub fn open(path: &Path) -> StoreResult<Self> {
        Ok(Self::new(Database::open(path)?))
    }

    /// Open a store backed by an in-memory database (for testing)
    pub fn open_in_memory() -> StoreResult<Self> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    /// Read and decode the value stored under `key`
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        let raw = {
            let db = self.db.lock().map_err(|_| StoreError::LockError)?;
            db.get(key)?
        };

        match raw {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|source| StoreError::Json {
                    key: key.to_string(),
                    source,
                }),
            None => Ok(None),
        }
    }

    /// Encode and store `value` under `key`, replacing any previous value
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> StoreResult<()> {
        let raw = serde_json::to_string(value).map_err(|source| StoreError::Json {
            key: key.to_string(),
            source,
        })?;

        let db = self.db.lock().map_err(|_| StoreError::LockError)?;
        db.set(key, &raw)?;
        Ok(())
    }

    /// Delete the value stored under `key`
    pub fn delete(&self, key: &str) -> StoreResult<()> {
        let db = self.db.lock().map_err(|_| StoreError::LockError)?;
        db.delete(key)?;
        Ok(())
    }

    /// Wait for exclusive write access to `key`
    ///
    /// Only writers coordinate through this lock. Plain [`Store::get`] calls
    /// never block on it and may observe the value from before an in-flight
    /// write.
    pub async fn write_lock(&self, key: &str) -> StoreResult<KeyLock> {
        let lock = {
            let mut locks = self.key_locks.lock().map_err(|_| StoreError::LockError)?;
            Arc::clone(locks.entry(key.to_string()).or_default())
        };

        let guard = lock.lock_owned().await;
        trace!(key = %key, "Acquired write lock");

        Ok(KeyLock {
            key: key.to_string(),
            _guard: guard,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Item {
        name: String,
    }

    #[test]
    fn test_get_missing_key() {
        let store = Store::open_in_memory().unwrap();
        let value: Option<Vec<Item>> = store.get("files.shares").unwrap();
        assert!(value.is_none());
    }

    #[test]
    fn test_set_and_get_typed_value() {
        let store = Store::open_in_memory().unwrap();
        let items = vec![Item {
            name: "Photos".to_string(),
        }];

        store.set("files.shares", &items).unwrap();
        let loaded: Vec<Item> = store.get("files.shares").unwrap().unwrap();
        assert_eq!(loaded, items);
    }

    #[test]
    fn test_get_with_wrong_type_is_json_error() {
        let store = Store::open_in_memory().unwrap();
        store.set("key", &42).unwrap();

        let result: StoreResult<Option<Vec<Item>>> = store.get("key");
        assert!(matches!(result, Err(StoreError::Json { .. })));
    }

    #[test]
    fn test_delete() {
        let store = Store::open_in_memory().unwrap();
        store.set("key", "value").unwrap();
        store.delete("key").unwrap();
        assert!(store.get::<String>("key").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_write_lock_is_exclusive_per_key() {
        let store = Arc::new(Store::open_in_memory().unwrap());

        let guard = store.write_lock("a").await.unwrap();
        assert_eq!(guard.key(), "a");

        // Same key waits
        let blocked = tokio::time::timeout(Duration::from_millis(50), store.write_lock("a")).await;
        assert!(blocked.is_err());

        // Other keys are independent
        let other = tokio::time::timeout(Duration::from_millis(50), store.write_lock("b")).await;
        assert!(other.is_ok());

        drop(guard);
        let reacquired =
            tokio::time::timeout(Duration::from_millis(50), store.write_lock("a")).await;
        assert!(reacquired.is_ok());
    }
}
