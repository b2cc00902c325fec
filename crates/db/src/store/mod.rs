use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

pub mod memory;
pub mod sql;

pub use memory::InMemoryDataStore;
pub use sql::SqlDataStore;

/// Snapshot of one plugin namespace, ordered by key.
pub type Entries = BTreeMap<String, Vec<u8>>;

/// Receives the current value and returns the value to store; `None` leaves the key untouched.
pub type UpdateFn =
    Box<dyn FnOnce(Option<&[u8]>) -> Result<Option<Vec<u8>>, StoreError> + Send + 'static>;

pub type RawUpdateFn = Box<dyn FnOnce(&mut Bucket) -> Result<(), StoreError> + Send + 'static>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("plugin namespace `{0}` was never initialized")]
    UnknownNamespace(String),
    #[error("stored value could not be decoded: {0}")]
    Codec(String),
    #[error("update aborted: {0}")]
    Aborted(String),
    #[error("store is closed")]
    Closed,
}

/// Staged view over one namespace handed to a raw update.
///
/// Reads observe earlier writes made through the same bucket. Nothing is persisted unless the
/// update returns `Ok`.
#[derive(Debug, Default)]
pub struct Bucket {
    entries: Entries,
    changes: BTreeMap<String, Option<Vec<u8>>>,
}

impl Bucket {
    pub(crate) fn new(entries: Entries) -> Self {
        Self { entries, changes: BTreeMap::new() }
    }

    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    pub fn put(&mut self, key: impl Into<String>, value: Vec<u8>) {
        let key = key.into();
        self.entries.insert(key.clone(), value.clone());
        self.changes.insert(key, Some(value));
    }

    pub fn delete(&mut self, key: &str) {
        self.entries.remove(key);
        self.changes.insert(key.to_owned(), None);
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub(crate) fn into_changes(self) -> BTreeMap<String, Option<Vec<u8>>> {
        self.changes
    }
}

/// Key/value access confined to a single plugin's namespace.
///
/// Writes are serialized store-wide, so `get_and_update` and `update_raw` are atomic with
/// respect to every other writer.
#[async_trait]
pub trait PluginStore: Send + Sync {
    fn plugin_id(&self) -> &str;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError>;

    /// Returns the value held by `key` once the update has been applied.
    async fn get_and_update(
        &self,
        key: &str,
        update: UpdateFn,
    ) -> Result<Option<Vec<u8>>, StoreError>;

    async fn update_raw(&self, update: RawUpdateFn) -> Result<(), StoreError>;

    async fn entries(&self) -> Result<Entries, StoreError>;
}

impl dyn PluginStore + '_ {
    pub async fn update<F>(&self, key: &str, update: F) -> Result<Option<Vec<u8>>, StoreError>
    where
        F: FnOnce(Option<&[u8]>) -> Result<Option<Vec<u8>>, StoreError> + Send + 'static,
    {
        self.get_and_update(key, Box::new(update)).await
    }

    pub async fn for_each<F>(&self, mut visit: F) -> Result<(), StoreError>
    where
        F: FnMut(&str, &[u8]) -> Result<(), StoreError>,
    {
        for (key, value) in self.entries().await? {
            visit(&key, &value)?;
        }
        Ok(())
    }
}

#[async_trait]
pub trait DataStore: Send + Sync {
    /// Idempotent; called once per plugin at registration.
    async fn init_namespace(&self, plugin_id: &str) -> Result<(), StoreError>;

    fn plugin_store(&self, plugin_id: &str) -> Arc<dyn PluginStore>;

    async fn ping(&self) -> Result<(), StoreError>;

    async fn close(&self);
}
