use std::sync::Arc;

use hivebot_core::{Channel, DirectoryCache, DirectoryError, User};
use hivebot_db::PluginStore;
use hivebot_slack::events::MessageEvent;
use hivebot_slack::{ApiError, CommandResponse, OutgoingMessage, SlackApi};
use serde_json::Value;
use tracing::info;

use crate::context::BotContext;

/// A plugin's view of the bot: messaging, directory lookups, and its own storage namespace.
///
/// Every message handed to a plugin carries one of these, scoped to the plugin that owns the
/// handler.
#[derive(Clone)]
pub struct PluginHelper {
    plugin_id: Arc<str>,
    context: BotContext,
    store: Arc<dyn PluginStore>,
}

impl PluginHelper {
    pub fn new(context: &BotContext, plugin_id: &str) -> Self {
        Self {
            plugin_id: Arc::from(plugin_id),
            store: context.store.plugin_store(plugin_id),
            context: context.clone(),
        }
    }

    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    /// Storage isolated to this plugin.
    pub fn store(&self) -> &dyn PluginStore {
        self.store.as_ref()
    }

    pub fn api(&self) -> &Arc<dyn SlackApi> {
        &self.context.api
    }

    pub fn directory(&self) -> &DirectoryCache {
        &self.context.directory
    }

    pub fn bot_user_id(&self) -> String {
        self.context.directory.bot_user_id()
    }

    pub fn user(&self, user_id: &str) -> Result<User, DirectoryError> {
        self.context.directory.user(user_id)
    }

    pub fn user_name(&self, user_id: &str) -> Result<String, DirectoryError> {
        self.context.directory.user_name(user_id)
    }

    pub fn channel(&self, channel_id: &str) -> Result<Channel, DirectoryError> {
        self.context.directory.channel(channel_id)
    }

    pub fn channel_id(&self, channel_name: &str) -> Result<String, DirectoryError> {
        self.context.directory.channel_id(channel_name)
    }

    /// Posts `text` to `channel_id`, returning the new message's timestamp.
    pub async fn say(&self, channel_id: &str, text: &str) -> Result<String, ApiError> {
        self.context.api.post_message(&OutgoingMessage::text(channel_id, text)).await
    }

    /// Replies in the message's channel, addressed to its author.
    pub async fn respond(&self, message: &MessageEvent, text: &str) -> Result<String, ApiError> {
        let text = match message.user.as_deref().filter(|user| !user.is_empty()) {
            Some(user) => format!("<@{user}>: {text}"),
            None => text.to_owned(),
        };
        let mut outgoing = OutgoingMessage::text(&message.channel, text);
        outgoing.thread_ts = message.thread_ts.clone();
        self.context.api.post_message(&outgoing).await
    }

    pub async fn react(&self, message: &MessageEvent, reaction: &str) -> Result<(), ApiError> {
        self.context.api.add_reaction(&message.channel, &message.ts, reaction).await
    }

    pub async fn react_to(
        &self,
        channel_id: &str,
        ts: &str,
        reaction: &str,
    ) -> Result<(), ApiError> {
        self.context.api.add_reaction(channel_id, ts, reaction).await
    }

    /// Posts a formatted reply to a channel regardless of its response type.
    pub async fn post(
        &self,
        channel_id: &str,
        response: &CommandResponse,
    ) -> Result<String, ApiError> {
        self.context.api.post_message(&OutgoingMessage::from_response(channel_id, response)).await
    }

    /// Posts a reply visible only to `user_id`.
    pub async fn post_ephemeral(
        &self,
        channel_id: &str,
        user_id: &str,
        response: &CommandResponse,
    ) -> Result<(), ApiError> {
        self.context
            .api
            .post_ephemeral(user_id, &OutgoingMessage::from_response(channel_id, response))
            .await
    }

    pub async fn open_view(&self, trigger_id: &str, view: &Value) -> Result<(), ApiError> {
        self.context.api.open_view(trigger_id, view).await
    }

    /// Sends a reply to a slash command's response URL outside the original request.
    pub async fn respond_to_slash_command(
        &self,
        response_url: &str,
        response: &CommandResponse,
    ) -> Result<(), ApiError> {
        self.context.api.post_response_url(response_url, response).await
    }

    /// Fires the process-wide shutdown signal.
    pub fn request_shutdown(&self) {
        info!(
            event_name = "dispatch.plugin.shutdown_requested",
            plugin_id = %self.plugin_id,
            "plugin requested bot shutdown"
        );
        self.context.shutdown.cancel();
    }

    pub fn shutdown_requested(&self) -> bool {
        self.context.shutdown.is_cancelled()
    }
}

impl std::fmt::Debug for PluginHelper {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.debug_struct("PluginHelper").field("plugin_id", &self.plugin_id).finish()
    }
}
