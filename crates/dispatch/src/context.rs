use std::sync::Arc;
use std::time::Duration;

use hivebot_core::config::DispatchConfig;
use hivebot_core::DirectoryCache;
use hivebot_db::DataStore;
use hivebot_slack::SlackApi;
use tokio_util::sync::CancellationToken;

/// Process-wide collaborators handed to every plugin helper.
#[derive(Clone)]
pub struct BotContext {
    pub api: Arc<dyn SlackApi>,
    pub directory: Arc<DirectoryCache>,
    pub store: Arc<dyn DataStore>,
    /// Root shutdown signal; firing it stops the dispatch loop and every handler worker.
    pub shutdown: CancellationToken,
}

impl BotContext {
    pub fn new(
        api: Arc<dyn SlackApi>,
        directory: Arc<DirectoryCache>,
        store: Arc<dyn DataStore>,
    ) -> Self {
        Self { api, directory, store, shutdown: CancellationToken::new() }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DispatchSettings {
    /// How long a slash command request waits for the plugin before answering empty.
    pub command_timeout: Duration,
    /// How long a webhook request waits for the plugin to signal completion.
    pub webhook_timeout: Duration,
    /// Capacity of each handler's inbound queue.
    pub handler_buffer: usize,
    /// Capacity of the queues feeding the dispatch loop.
    pub inbound_buffer: usize,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self::from(&DispatchConfig::default())
    }
}

impl From<&DispatchConfig> for DispatchSettings {
    fn from(config: &DispatchConfig) -> Self {
        Self {
            command_timeout: config.command_timeout(),
            webhook_timeout: config.webhook_timeout(),
            handler_buffer: config.handler_buffer.max(1),
            inbound_buffer: 256,
        }
    }
}
