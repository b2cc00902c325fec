pub mod config;
pub mod directory;
pub mod errors;

pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
pub use directory::{Channel, DirectoryCache, DirectoryError, Identity, User};
pub use errors::{InterfaceError, GENERIC_FAILURE_MESSAGE};
