use std::sync::Arc;

use hivebot_slack::{InteractionCallback, SlashCommand};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::messages::{ReplySender, WebhookRequest, WebhookResponse};
use crate::registry::PluginRegistry;

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("the dispatch loop is not running")]
    Stopped,
}

pub(crate) struct PendingCommand {
    pub command: SlashCommand,
    pub reply: ReplySender,
}

pub(crate) struct PendingWebhook {
    pub name: String,
    pub request: WebhookRequest,
    pub responder: oneshot::Sender<WebhookResponse>,
}

/// The single consumer of inbound commands, webhooks and interactions.
pub struct Dispatcher {
    registry: Arc<PluginRegistry>,
    commands: mpsc::Receiver<PendingCommand>,
    webhooks: mpsc::Receiver<PendingWebhook>,
    interactions: mpsc::Receiver<InteractionCallback>,
}

/// Producer side of the dispatch loop, cloned into every intake.
#[derive(Clone)]
pub struct DispatchHandle {
    commands: mpsc::Sender<PendingCommand>,
    webhooks: mpsc::Sender<PendingWebhook>,
    interactions: mpsc::Sender<InteractionCallback>,
    registry: Arc<PluginRegistry>,
}

pub fn dispatch_channel(
    registry: Arc<PluginRegistry>,
    capacity: usize,
) -> (Dispatcher, DispatchHandle) {
    let capacity = capacity.max(1);
    let (command_tx, command_rx) = mpsc::channel(capacity);
    let (webhook_tx, webhook_rx) = mpsc::channel(capacity);
    let (interaction_tx, interaction_rx) = mpsc::channel(capacity);

    let dispatcher = Dispatcher {
        registry: registry.clone(),
        commands: command_rx,
        webhooks: webhook_rx,
        interactions: interaction_rx,
    };
    let handle = DispatchHandle {
        commands: command_tx,
        webhooks: webhook_tx,
        interactions: interaction_tx,
        registry,
    };
    (dispatcher, handle)
}

impl Dispatcher {
    /// Routes inbound work until `cancel` fires. Routing never waits on a handler.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(event_name = "dispatch.loop.started", "dispatch loop started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                Some(pending) = self.commands.recv() => {
                    self.registry.route_command(pending.command, pending.reply);
                }
                Some(pending) = self.webhooks.recv() => {
                    self.registry.route_webhook(pending.name, pending.request, pending.responder);
                }
                Some(callback) = self.interactions.recv() => {
                    self.registry.route_interaction(callback);
                }
                else => {
                    debug!("every dispatch handle dropped");
                    break;
                }
            }
        }
        info!(event_name = "dispatch.loop.stopped", "dispatch loop stopped");
    }
}

impl DispatchHandle {
    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    pub(crate) async fn submit_command(
        &self,
        command: SlashCommand,
        reply: ReplySender,
    ) -> Result<(), DispatchError> {
        self.commands
            .send(PendingCommand { command, reply })
            .await
            .map_err(|_| DispatchError::Stopped)
    }

    pub(crate) async fn submit_webhook(
        &self,
        pending: PendingWebhook,
    ) -> Result<(), DispatchError> {
        self.webhooks.send(pending).await.map_err(|_| DispatchError::Stopped)
    }

    /// Queues an interaction callback for routing; there is no reply to wait for.
    pub async fn submit_interaction(
        &self,
        callback: InteractionCallback,
    ) -> Result<(), DispatchError> {
        self.interactions.send(callback).await.map_err(|_| DispatchError::Stopped)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use hivebot_slack::{CommandResponse, SlashCommand};
    use tokio::sync::oneshot;
    use tokio_util::sync::CancellationToken;

    use super::{dispatch_channel, DispatchError};
    use crate::messages::CommandMsg;
    use crate::plugin::{Handler, Plugin};
    use crate::registry::PluginRegistry;
    use crate::test_support::harness;

    #[tokio::test]
    async fn loop_routes_until_cancelled() {
        let harness = harness();
        let mut registry = PluginRegistry::new(harness.context.clone(), 4);
        let echo = Handler::named("echo", |mut msg: CommandMsg| async move {
            let text = msg.command.text.clone();
            msg.reply_with(CommandResponse::in_channel(text));
        });
        registry.register(Plugin::new("echo").command(echo)).await.expect("register");

        let (dispatcher, handle) = dispatch_channel(Arc::new(registry), 8);
        let cancel = CancellationToken::new();
        let running = tokio::spawn(dispatcher.run(cancel.clone()));

        let (reply, replies) = oneshot::channel();
        let command = SlashCommand {
            name: "echo".to_owned(),
            text: "hi".to_owned(),
            ..SlashCommand::default()
        };
        handle.submit_command(command, reply).await.expect("submit");
        let response = tokio::time::timeout(Duration::from_secs(1), replies)
            .await
            .expect("reply in time")
            .expect("reply sent");
        assert_eq!(response, Some(CommandResponse::in_channel("hi")));

        cancel.cancel();
        running.await.expect("loop exits");

        let (reply, _replies) = oneshot::channel();
        assert_eq!(
            handle.submit_command(SlashCommand::default(), reply).await,
            Err(DispatchError::Stopped)
        );
    }
}
