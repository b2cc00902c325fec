pub mod connection;
pub mod migrations;
pub mod store;

pub use connection::{connect, connect_with_settings, ping, DbPool};
pub use store::{
    Bucket, DataStore, Entries, InMemoryDataStore, PluginStore, RawUpdateFn, SqlDataStore,
    StoreError, UpdateFn,
};
