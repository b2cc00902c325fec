use std::sync::Arc;
use std::time::Duration;

use hivebot_slack::{CommandResponse, InteractionCallback, OutgoingMessage, SlackApi, SlashCommand};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tracing::{info, warn};

use crate::dispatcher::{DispatchError, DispatchHandle, PendingWebhook};
use crate::messages::{WebhookRequest, WebhookResponse};

/// How a slash command request ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The plugin answered in time.
    Replied(CommandResponse),
    /// The plugin answered in time with nothing to say.
    Deferred,
    /// The plugin did not answer in time; any later answer goes out of band.
    TimedOut,
    /// The command was dropped without an answer: no handler, a full queue, or a handler that
    /// discarded the message.
    Dropped,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebhookOutcome {
    Responded(WebhookResponse),
    /// The plugin finished without writing a response.
    Completed,
    TimedOut,
}

/// Joins a synchronous intake request to the plugin reply it is waiting for.
#[derive(Clone)]
pub struct ReplyCorrelator {
    handle: DispatchHandle,
    api: Arc<dyn SlackApi>,
    command_timeout: Duration,
    webhook_timeout: Duration,
}

impl ReplyCorrelator {
    pub fn new(
        handle: DispatchHandle,
        api: Arc<dyn SlackApi>,
        command_timeout: Duration,
        webhook_timeout: Duration,
    ) -> Self {
        Self { handle, api, command_timeout, webhook_timeout }
    }

    pub fn handle(&self) -> &DispatchHandle {
        &self.handle
    }

    /// Dispatches `command` and waits at most the command timeout for its reply.
    pub async fn dispatch_command(
        &self,
        command: SlashCommand,
    ) -> Result<CommandOutcome, DispatchError> {
        let deadline = Instant::now() + self.command_timeout;
        let fallback = command.clone();
        let (reply, mut replies) = oneshot::channel();

        match timeout_at(deadline, self.handle.submit_command(command, reply)).await {
            Ok(submitted) => submitted?,
            Err(_) => {
                warn!(
                    event_name = "dispatch.command.timed_out",
                    command = %fallback.name,
                    stage = "submit",
                    "dispatch loop did not accept the command in time"
                );
                return Ok(CommandOutcome::TimedOut);
            }
        }

        match timeout_at(deadline, &mut replies).await {
            Ok(Ok(Some(response))) => Ok(CommandOutcome::Replied(response)),
            Ok(Ok(None)) => Ok(CommandOutcome::Deferred),
            Ok(Err(_)) => Ok(CommandOutcome::Dropped),
            Err(_) => {
                warn!(
                    event_name = "dispatch.command.timed_out",
                    command = %fallback.name,
                    timeout_ms = self.command_timeout.as_millis() as u64,
                    "plugin did not reply in time"
                );
                // A reply that landed between the deadline and the close is still ours to send.
                replies.close();
                if let Ok(Some(response)) = replies.try_recv() {
                    spawn_out_of_band(self.api.clone(), fallback, response);
                }
                Ok(CommandOutcome::TimedOut)
            }
        }
    }

    /// Dispatches a command typed as a bot mention. Mentions have no request to answer, so the
    /// wait runs detached and any reply is posted to the channel.
    pub fn dispatch_mention(&self, command: SlashCommand) -> JoinHandle<CommandOutcome> {
        let correlator = self.clone();
        tokio::spawn(async move {
            match correlator.dispatch_command(command.clone()).await {
                Ok(CommandOutcome::Replied(response)) => {
                    deliver_out_of_band(correlator.api.as_ref(), &command, &response).await;
                    CommandOutcome::Replied(response)
                }
                Ok(outcome) => outcome,
                Err(error) => {
                    warn!(
                        event_name = "dispatch.mention.failed",
                        command = %command.name,
                        error = %error,
                        "could not dispatch mention command"
                    );
                    CommandOutcome::Dropped
                }
            }
        })
    }

    /// Dispatches a webhook request and waits at most the webhook timeout for the plugin to
    /// finish with it.
    pub async fn dispatch_webhook(
        &self,
        name: &str,
        request: WebhookRequest,
    ) -> Result<WebhookOutcome, DispatchError> {
        let deadline = Instant::now() + self.webhook_timeout;
        let (responder, response) = oneshot::channel();
        let pending = PendingWebhook { name: name.to_owned(), request, responder };

        let submitted = match timeout_at(deadline, self.handle.submit_webhook(pending)).await {
            Ok(submitted) => submitted,
            Err(_) => return Ok(self.webhook_timed_out(name)),
        };
        submitted?;

        match timeout_at(deadline, response).await {
            Ok(Ok(response)) => Ok(WebhookOutcome::Responded(response)),
            Ok(Err(_)) => Ok(WebhookOutcome::Completed),
            Err(_) => Ok(self.webhook_timed_out(name)),
        }
    }

    fn webhook_timed_out(&self, name: &str) -> WebhookOutcome {
        warn!(
            event_name = "dispatch.webhook.timed_out",
            webhook = %name,
            timeout_ms = self.webhook_timeout.as_millis() as u64,
            "webhook handler did not finish in time"
        );
        WebhookOutcome::TimedOut
    }

    pub async fn dispatch_interaction(
        &self,
        callback: InteractionCallback,
    ) -> Result<(), DispatchError> {
        self.handle.submit_interaction(callback).await
    }
}

pub(crate) fn spawn_out_of_band(
    api: Arc<dyn SlackApi>,
    command: SlashCommand,
    response: CommandResponse,
) {
    tokio::spawn(async move {
        deliver_out_of_band(api.as_ref(), &command, &response).await;
    });
}

/// Sends a reply outside the original request: to the response URL for slash commands, or as a
/// chat post for mentions (ephemeral unless the reply is in-channel).
pub(crate) async fn deliver_out_of_band(
    api: &dyn SlackApi,
    command: &SlashCommand,
    response: &CommandResponse,
) {
    let (route, result) = if !command.is_mention() {
        ("response_url", api.post_response_url(&command.response_url, response).await)
    } else {
        let message = OutgoingMessage::from_response(&command.channel_id, response);
        if response.is_in_channel() {
            ("chat_post", api.post_message(&message).await.map(|_| ()))
        } else {
            ("chat_ephemeral", api.post_ephemeral(&command.user_id, &message).await)
        }
    };

    match result {
        Ok(()) => info!(
            event_name = "dispatch.reply.out_of_band",
            command = %command.name,
            route,
            "delivered command reply out of band"
        ),
        Err(error) => warn!(
            event_name = "dispatch.reply.out_of_band_failed",
            command = %command.name,
            route,
            error = %error,
            "could not deliver command reply"
        ),
    }
}
