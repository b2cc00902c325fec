use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Bucket, DataStore, Entries, PluginStore, RawUpdateFn, StoreError, UpdateFn};

#[derive(Default)]
struct Shared {
    namespaces: RwLock<HashMap<String, Entries>>,
    closed: AtomicBool,
}

impl Shared {
    fn check_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::Acquire) {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }
}

/// Process-local store with the same single-writer semantics as the sqlite store.
#[derive(Clone, Default)]
pub struct InMemoryDataStore {
    shared: Arc<Shared>,
}

impl InMemoryDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl DataStore for InMemoryDataStore {
    async fn init_namespace(&self, plugin_id: &str) -> Result<(), StoreError> {
        self.shared.check_open()?;
        let mut namespaces = self.shared.namespaces.write().await;
        namespaces.entry(plugin_id.to_owned()).or_default();
        Ok(())
    }

    fn plugin_store(&self, plugin_id: &str) -> Arc<dyn PluginStore> {
        Arc::new(InMemoryPluginStore {
            plugin_id: plugin_id.to_owned(),
            shared: Arc::clone(&self.shared),
        })
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.shared.check_open()
    }

    async fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
    }
}

struct InMemoryPluginStore {
    plugin_id: String,
    shared: Arc<Shared>,
}

impl InMemoryPluginStore {
    fn unknown(&self) -> StoreError {
        StoreError::UnknownNamespace(self.plugin_id.clone())
    }
}

#[async_trait]
impl PluginStore for InMemoryPluginStore {
    fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.shared.check_open()?;
        let namespaces = self.shared.namespaces.read().await;
        Ok(namespaces.get(&self.plugin_id).and_then(|entries| entries.get(key)).cloned())
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        self.shared.check_open()?;
        let mut namespaces = self.shared.namespaces.write().await;
        let entries = namespaces.get_mut(&self.plugin_id).ok_or_else(|| self.unknown())?;
        entries.insert(key.to_owned(), value);
        Ok(())
    }

    async fn get_and_update(
        &self,
        key: &str,
        update: UpdateFn,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        self.shared.check_open()?;
        let mut namespaces = self.shared.namespaces.write().await;
        let entries = namespaces.get_mut(&self.plugin_id).ok_or_else(|| self.unknown())?;

        match update(entries.get(key).map(Vec::as_slice))? {
            Some(next) => {
                entries.insert(key.to_owned(), next.clone());
                Ok(Some(next))
            }
            None => Ok(entries.get(key).cloned()),
        }
    }

    async fn update_raw(&self, update: RawUpdateFn) -> Result<(), StoreError> {
        self.shared.check_open()?;
        let mut namespaces = self.shared.namespaces.write().await;
        let entries = namespaces.get_mut(&self.plugin_id).ok_or_else(|| self.unknown())?;

        let mut bucket = Bucket::new(entries.clone());
        update(&mut bucket)?;
        for (key, change) in bucket.into_changes() {
            match change {
                Some(value) => entries.insert(key, value),
                None => entries.remove(&key),
            };
        }
        Ok(())
    }

    async fn entries(&self) -> Result<Entries, StoreError> {
        self.shared.check_open()?;
        let namespaces = self.shared.namespaces.read().await;
        Ok(namespaces.get(&self.plugin_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use crate::store::{DataStore, InMemoryDataStore, StoreError};

    #[tokio::test]
    async fn in_memory_store_round_trip() {
        let data = InMemoryDataStore::new();
        data.init_namespace("echo").await.expect("init");
        let echo = data.plugin_store("echo");

        echo.put("last", b"hello".to_vec()).await.expect("put");
        let stored = echo
            .update("last", |current| {
                let mut next = current.unwrap_or_default().to_vec();
                next.extend_from_slice(b" world");
                Ok(Some(next))
            })
            .await
            .expect("update");

        assert_eq!(stored, Some(b"hello world".to_vec()));
        assert_eq!(echo.get("last").await.expect("get"), Some(b"hello world".to_vec()));
    }

    #[tokio::test]
    async fn closed_in_memory_store_rejects_access() {
        let data = InMemoryDataStore::new();
        data.init_namespace("echo").await.expect("init");
        data.close().await;

        assert!(data.is_closed());
        assert!(matches!(data.plugin_store("echo").get("k").await, Err(StoreError::Closed)));
        assert!(matches!(data.ping().await, Err(StoreError::Closed)));
    }

    #[tokio::test]
    async fn aborted_raw_update_changes_nothing() {
        let data = InMemoryDataStore::new();
        data.init_namespace("echo").await.expect("init");
        let echo = data.plugin_store("echo");
        echo.put("keep", b"1".to_vec()).await.expect("put");

        let outcome = echo
            .update_raw(Box::new(|bucket| {
                bucket.delete("keep");
                Err(StoreError::Aborted("changed my mind".to_owned()))
            }))
            .await;

        assert!(outcome.is_err());
        assert_eq!(echo.get("keep").await.expect("get"), Some(b"1".to_vec()));
    }
}
