//! Persisted share registry
//!
//! The registry is a single JSON list stored under [`SHARES_KEY`]. There is no
//! in-memory cache: every call reads the store, and every mutation runs as
//! read, modify, write inside the store's write lock for the key.

use std::sync::Arc;

use tracing::debug;

use super::ShareRecord;
use crate::store::{Store, StoreError, StoreResult};

/// Store key holding the share list
pub const SHARES_KEY: &str = "files.shares";

/// Replacement collection produced by a [`ShareRegistry::mutate`] closure
///
/// Setting replaces the whole collection. Nothing is written if the closure
/// never calls [`PendingWrite::set`] or returns an error.
#[derive(Debug, Default)]
pub struct PendingWrite {
    shares: Option<Vec<ShareRecord>>,
}

impl PendingWrite {
    pub fn set(&mut self, shares: Vec<ShareRecord>) {
        self.shares = Some(shares);
    }

    pub fn is_set(&self) -> bool {
        self.shares.is_some()
    }
}

/// Share records persisted under one store key
#[derive(Clone)]
pub struct ShareRegistry {
    store: Arc<Store>,
    key: String,
}

impl ShareRegistry {
    /// Registry stored under the default [`SHARES_KEY`]
    pub fn new(store: Arc<Store>) -> Self {
        Self::with_key(store, SHARES_KEY)
    }

    pub fn with_key(store: Arc<Store>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Current records, without taking the write lock
    ///
    /// May not reflect a mutation that is still in progress.
    pub fn list(&self) -> StoreResult<Vec<ShareRecord>> {
        Ok(self.store.get(&self.key)?.unwrap_or_default())
    }

    /// Run `f` as an exclusive read-modify-write on the registry
    ///
    /// `f` sees the current records and may stage a complete replacement
    /// through [`PendingWrite`]. The lock is held from before the read until
    /// after the write; at most one closure runs at a time per key. If `f`
    /// fails, nothing is written.
    pub async fn mutate<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&[ShareRecord], &mut PendingWrite) -> Result<T, E>,
        E: From<StoreError>,
    {
        let _lock = self.store.write_lock(&self.key).await?;

        let current = self.list()?;
        let mut pending = PendingWrite::default();
        let value = f(&current, &mut pending)?;

        if let Some(shares) = pending.shares {
            debug!(key = %self.key, count = shares.len(), "Writing share registry");
            self.store.set(&self.key, &shares)?;
        }

        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shares::ShareError;

    fn registry() -> ShareRegistry {
        ShareRegistry::new(Arc::new(Store::open_in_memory().unwrap()))
    }

    #[test]
    fn test_missing_key_is_empty() {
        let registry = registry();
        assert_eq!(registry.key(), "files.shares");
        assert!(registry.list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mutate_replaces_collection() {
        let registry = registry();

        registry
            .mutate(|_, pending| {
                pending.set(vec![
                    ShareRecord::new("A", "/Data/A"),
                    ShareRecord::new("B", "/Data/B"),
                ]);
                Ok::<_, ShareError>(())
            })
            .await
            .unwrap();

        registry
            .mutate(|shares, pending| {
                assert_eq!(shares.len(), 2);
                pending.set(vec![ShareRecord::new("C", "/Data/C")]);
                Ok::<_, ShareError>(())
            })
            .await
            .unwrap();

        assert_eq!(registry.list().unwrap(), vec![ShareRecord::new("C", "/Data/C")]);
    }

    #[tokio::test]
    async fn test_mutate_without_set_writes_nothing() {
        let registry = registry();

        let seen = registry
            .mutate(|shares, _| Ok::<_, ShareError>(shares.len()))
            .await
            .unwrap();

        assert_eq!(seen, 0);
        assert!(registry.store.get::<Vec<ShareRecord>>(SHARES_KEY).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_mutation_does_not_persist_and_releases_lock() {
        let registry = registry();

        let result: Result<(), ShareError> = registry
            .mutate(|_, pending| {
                pending.set(vec![ShareRecord::new("A", "/Data/A")]);
                Err(ShareError::AlreadyExists("/Data/A".to_string()))
            })
            .await;

        assert!(matches!(result, Err(ShareError::AlreadyExists(_))));
        assert!(registry.list().unwrap().is_empty());

        // Lock was released
        let next = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            registry.mutate(|_, _| Ok::<_, ShareError>(())),
        )
        .await;
        assert!(next.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_appends_are_not_lost() {
        let registry = registry();

        let mut tasks = Vec::new();
        for i in 0..50 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                registry
                    .mutate(|shares, pending| {
                        let mut next = shares.to_vec();
                        next.push(ShareRecord::new(format!("S{}", i), format!("/Data/{}", i)));
                        pending.set(next);
                        Ok::<_, ShareError>(())
                    })
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(registry.list().unwrap().len(), 50);
    }
}
