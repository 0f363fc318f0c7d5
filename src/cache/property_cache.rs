use async_trait::async_trait;
use log::{debug, warn};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;

use crate::errors::Result;
use crate::persistency::property_repository::PropertyRepository;

pub const PROPERTY_TYPE: &str = "type";
pub const PROPERTY_SIZE: &str = "size";
pub const PROPERTY_RAW_SIZE: &str = "raw_size";
pub const PROPERTY_ANNOTATED_SIZE: &str = "annotated_size";

/// Durable `(id, version, property) -> value` store backing the cache
#[async_trait]
pub trait PropertyStore: Send + Sync {
    async fn get(&self, item_id: &str, version: u64, property: &str) -> Result<Option<String>>;
    async fn put(&self, item_id: &str, version: u64, property: &str, value: &str) -> Result<()>;
}

#[async_trait]
impl PropertyStore for PropertyRepository {
    async fn get(&self, item_id: &str, version: u64, property: &str) -> Result<Option<String>> {
        self.get_property(item_id, version, property).await
    }

    async fn put(&self, item_id: &str, version: u64, property: &str, value: &str) -> Result<()> {
        self.store_property(item_id, version, property, value).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PropertyKey {
    item_id: String,
    version: u64,
    property: String,
}

type KeyLock = Arc<Mutex<()>>;

/// Version-keyed cache of expensive per-item properties.
///
/// A hit needs an exact version match. Computations for one key are
/// serialized: the first caller computes and stores, callers that arrive
/// meanwhile wait on the same key lock and then read the stored value.
/// Values are persisted as JSON; nothing is written when a computation fails.
pub struct DerivedPropertyCache {
    store: Arc<dyn PropertyStore>,
    in_flight: StdMutex<HashMap<PropertyKey, KeyLock>>,
}

/// Removes the key lock from the in-flight map once nobody else holds it,
/// also when the computing future is dropped midway.
struct InFlight<'a> {
    cache: &'a DerivedPropertyCache,
    key: PropertyKey,
    lock: KeyLock,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut in_flight = self
            .cache
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // one reference in the map, one here
        if Arc::strong_count(&self.lock) <= 2 {
            in_flight.remove(&self.key);
        }
    }
}

impl DerivedPropertyCache {
    pub fn new(store: Arc<dyn PropertyStore>) -> Self {
        Self {
            store,
            in_flight: StdMutex::new(HashMap::new()),
        }
    }

    /// Stored value for the exact key, or the result of `compute`, stored
    /// under `version` before it is returned.
    pub async fn get_or_compute<T, F, Fut>(
        &self,
        item_id: &str,
        version: u64,
        property: &str,
        compute: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.get_or_compute_if(item_id, version, property, compute, |_| true)
            .await
    }

    /// Like [`get_or_compute`](Self::get_or_compute), but a computed value is
    /// only stored when `should_store` accepts it.
    pub async fn get_or_compute_if<T, F, Fut, P>(
        &self,
        item_id: &str,
        version: u64,
        property: &str,
        compute: F,
        should_store: P,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
        P: FnOnce(&T) -> bool,
    {
        let key = PropertyKey {
            item_id: item_id.to_string(),
            version,
            property: property.to_string(),
        };

        if let Some(value) = self.lookup(&key).await? {
            debug!("🎯 Property hit: {} of {} at version {}", property, item_id, version);
            return Ok(value);
        }

        let in_flight = self.key_lock(&key);
        let _guard = in_flight.lock.lock().await;

        // another caller may have computed it while we waited
        if let Some(value) = self.lookup(&key).await? {
            debug!("🤝 Property computed by a concurrent caller: {} of {}", property, item_id);
            return Ok(value);
        }

        debug!("⚙️ Computing {} of {} at version {}", property, item_id, version);
        let value = compute().await?;
        if should_store(&value) {
            self.write(&key, &value).await?;
        } else {
            debug!("⏭️ Not caching {} of {}", property, item_id);
        }
        Ok(value)
    }

    /// Store a value computed elsewhere, replacing whatever the key held
    pub async fn store<T: Serialize>(
        &self,
        item_id: &str,
        version: u64,
        property: &str,
        value: &T,
    ) -> Result<()> {
        let key = PropertyKey {
            item_id: item_id.to_string(),
            version,
            property: property.to_string(),
        };
        self.write(&key, value).await
    }

    /// Stored value for the exact key, without computing anything
    pub async fn peek<T: DeserializeOwned>(
        &self,
        item_id: &str,
        version: u64,
        property: &str,
    ) -> Result<Option<T>> {
        let key = PropertyKey {
            item_id: item_id.to_string(),
            version,
            property: property.to_string(),
        };
        self.lookup(&key).await
    }

    async fn lookup<T: DeserializeOwned>(&self, key: &PropertyKey) -> Result<Option<T>> {
        let Some(raw) = self
            .store
            .get(&key.item_id, key.version, &key.property)
            .await?
        else {
            return Ok(None);
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(
                    "⚠️ Discarding unreadable {} of {}: {}",
                    key.property, key.item_id, e
                );
                Ok(None)
            }
        }
    }

    async fn write<T: Serialize>(&self, key: &PropertyKey, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.store
            .put(&key.item_id, key.version, &key.property, &raw)
            .await
    }

    fn key_lock(&self, key: &PropertyKey) -> InFlight<'_> {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let lock = in_flight
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        InFlight {
            cache: self,
            key: key.clone(),
            lock,
        }
    }

    #[cfg(test)]
    fn in_flight_len(&self) -> usize {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::CloudError;
    use crate::persistency::PersistencyManager;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::tempdir;

    async fn open_cache(db_path: &Path) -> (PersistencyManager, DerivedPropertyCache) {
        let manager = PersistencyManager::new(db_path).await.unwrap();
        manager.init_database().await.unwrap();
        let repo = PropertyRepository::new(manager.pool().clone(), None);
        (manager, DerivedPropertyCache::new(Arc::new(repo)))
    }

    #[tokio::test]
    async fn test_computes_once_per_version() {
        let dir = tempdir().unwrap();
        let (_manager, cache) = open_cache(&dir.path().join("filedata.db")).await;
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            let value: String = cache
                .get_or_compute("d", 1, PROPERTY_TYPE, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok("pdf".to_string())
                })
                .await
                .unwrap();
            assert_eq!(value, "pdf");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let value: String = cache
            .get_or_compute("d", 2, PROPERTY_TYPE, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok("epub".to_string())
            })
            .await
            .unwrap();
        assert_eq!(value, "epub");
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // the older version is still served from the store
        let old: Option<String> = cache.peek("d", 1, PROPERTY_TYPE).await.unwrap();
        assert_eq!(old.as_deref(), Some("pdf"));
        assert_eq!(cache.in_flight_len(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_computation() {
        let dir = tempdir().unwrap();
        let (_manager, cache) = open_cache(&dir.path().join("filedata.db")).await;
        let cache = Arc::new(cache);
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_compute("d", 3, PROPERTY_SIZE, || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(1234u64)
                    })
                    .await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 1234);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.in_flight_len(), 0);
    }

    #[tokio::test]
    async fn test_failed_computation_writes_nothing() {
        let dir = tempdir().unwrap();
        let (_manager, cache) = open_cache(&dir.path().join("filedata.db")).await;

        let failed: Result<u64> = cache
            .get_or_compute("d", 1, PROPERTY_SIZE, || async {
                Err(CloudError::transport("boom"))
            })
            .await;
        assert!(matches!(failed, Err(CloudError::Transport(_))));
        assert!(cache.peek::<u64>("d", 1, PROPERTY_SIZE).await.unwrap().is_none());

        let value = cache
            .get_or_compute("d", 1, PROPERTY_SIZE, || async { Ok(7u64) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_rejected_values_are_not_stored() {
        let dir = tempdir().unwrap();
        let (_manager, cache) = open_cache(&dir.path().join("filedata.db")).await;
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            let value: String = cache
                .get_or_compute_if(
                    "d",
                    1,
                    PROPERTY_TYPE,
                    || async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok("unknown".to_string())
                    },
                    |value| value != "unknown",
                )
                .await
                .unwrap();
            assert_eq!(value, "unknown");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("filedata.db");

        let (manager, cache) = open_cache(&db_path).await;
        cache.store("d", 4, PROPERTY_RAW_SIZE, &99u64).await.unwrap();
        drop(cache);
        manager.close().await;

        let (_manager, reopened) = open_cache(&db_path).await;
        let value: u64 = reopened
            .get_or_compute("d", 4, PROPERTY_RAW_SIZE, || async {
                Err(CloudError::transport("value should come from the store"))
            })
            .await
            .unwrap();
        assert_eq!(value, 99);
    }

    #[tokio::test]
    async fn test_dropped_computation_leaves_nothing_behind() {
        let dir = tempdir().unwrap();
        let (_manager, cache) = open_cache(&dir.path().join("filedata.db")).await;
        let cache = Arc::new(cache);
        let (started_tx, started_rx) = tokio::sync::oneshot::channel();

        let stuck = {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache
                    .get_or_compute("d", 1, PROPERTY_SIZE, || async move {
                        let _ = started_tx.send(());
                        std::future::pending::<Result<u64>>().await
                    })
                    .await
            })
        };
        started_rx.await.unwrap();
        assert_eq!(cache.in_flight_len(), 1);

        stuck.abort();
        assert!(stuck.await.unwrap_err().is_cancelled());
        assert_eq!(cache.in_flight_len(), 0);
        assert!(cache.peek::<u64>("d", 1, PROPERTY_SIZE).await.unwrap().is_none());

        // the key lock went with the dropped future, so the next caller computes
        let value = cache
            .get_or_compute("d", 1, PROPERTY_SIZE, || async { Ok(5u64) })
            .await
            .unwrap();
        assert_eq!(value, 5);
        assert_eq!(cache.in_flight_len(), 0);
        assert_eq!(cache.peek::<u64>("d", 1, PROPERTY_SIZE).await.unwrap(), Some(5));
    }
}
