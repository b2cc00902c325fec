use hivebot_slack::events::{MessageEvent, ReactionAddedEvent};
use hivebot_slack::{CommandResponse, InteractionCallback, SlashCommand};
use tokio::sync::oneshot;
use tracing::warn;

use crate::correlator::spawn_out_of_band;
use crate::helper::PluginHelper;

pub(crate) type ReplySender = oneshot::Sender<Option<CommandResponse>>;

/// What happened to a command reply.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplyStatus {
    /// The waiting request picked the reply up.
    Delivered,
    /// The request had given up; the reply was sent to the response URL or posted to chat.
    OutOfBand,
    /// The request had given up and there was nothing to send.
    Abandoned,
    AlreadyReplied,
}

/// A slash command or bot mention routed to a command handler.
#[derive(Debug)]
pub struct CommandMsg {
    pub helper: PluginHelper,
    pub command: SlashCommand,
    reply: Option<ReplySender>,
}

impl CommandMsg {
    pub(crate) fn new(helper: PluginHelper, command: SlashCommand, reply: ReplySender) -> Self {
        Self { helper, command, reply: Some(reply) }
    }

    /// Answers the command. `None` means the plugin handles the user itself.
    ///
    /// Replies that arrive after the request stopped waiting are delivered out of band, so each
    /// reply reaches the user exactly once.
    pub fn reply(&mut self, response: Option<CommandResponse>) -> ReplyStatus {
        let Some(sender) = self.reply.take() else {
            warn!(
                event_name = "dispatch.reply.duplicate",
                plugin_id = self.helper.plugin_id(),
                command = %self.command.name,
                "command already replied to"
            );
            return ReplyStatus::AlreadyReplied;
        };

        match sender.send(response) {
            Ok(()) => ReplyStatus::Delivered,
            Err(Some(response)) => {
                spawn_out_of_band(self.helper.api().clone(), self.command.clone(), response);
                ReplyStatus::OutOfBand
            }
            Err(None) => ReplyStatus::Abandoned,
        }
    }

    pub fn reply_with(&mut self, response: CommandResponse) -> ReplyStatus {
        self.reply(Some(response))
    }
}

/// An inbound HTTP request addressed to a named plugin webhook.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WebhookRequest {
    pub method: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl WebhookRequest {
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.iter().find(|(key, _)| key == name).map(|(_, value)| value.as_str())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WebhookResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl WebhookResponse {
    pub fn empty() -> Self {
        Self { status: 200, content_type: None, body: Vec::new() }
    }

    pub fn text(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            content_type: Some("text/plain; charset=utf-8".to_owned()),
            body: body.into().into_bytes(),
        }
    }

    pub fn json(value: &serde_json::Value) -> Self {
        Self {
            status: 200,
            content_type: Some("application/json".to_owned()),
            body: value.to_string().into_bytes(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }
}

impl Default for WebhookResponse {
    fn default() -> Self {
        Self::empty()
    }
}

/// A webhook request handed to a plugin.
///
/// Responding, or dropping the message, tells the waiting HTTP request the plugin is done.
#[derive(Debug)]
pub struct WebhookMsg {
    pub helper: PluginHelper,
    pub name: String,
    pub request: WebhookRequest,
    responder: Option<oneshot::Sender<WebhookResponse>>,
}

impl WebhookMsg {
    pub(crate) fn new(
        helper: PluginHelper,
        name: String,
        request: WebhookRequest,
        responder: oneshot::Sender<WebhookResponse>,
    ) -> Self {
        Self { helper, name, request, responder: Some(responder) }
    }

    /// Returns false when the request already stopped waiting or a response was sent.
    pub fn respond(&mut self, response: WebhookResponse) -> bool {
        match self.responder.take() {
            Some(responder) => responder.send(response).is_ok(),
            None => false,
        }
    }
}

#[derive(Debug)]
pub struct InteractionMsg {
    pub helper: PluginHelper,
    pub callback: InteractionCallback,
}

/// A channel message fanned out to every hook.
#[derive(Debug)]
pub struct HookMsg {
    pub helper: PluginHelper,
    pub message: MessageEvent,
}

#[derive(Debug)]
pub struct ReactionMsg {
    pub helper: PluginHelper,
    pub reaction: ReactionAddedEvent,
}

#[cfg(test)]
mod tests {
    use hivebot_slack::{CommandResponse, SlashCommand};
    use tokio::sync::oneshot;

    use super::{CommandMsg, ReplyStatus, WebhookRequest};
    use crate::helper::PluginHelper;
    use crate::test_support::{harness, Recorded};

    fn command(response_url: &str) -> SlashCommand {
        SlashCommand {
            name: "roll".to_owned(),
            channel_id: "C1".to_owned(),
            user_id: "U1".to_owned(),
            response_url: response_url.to_owned(),
            ..SlashCommand::default()
        }
    }

    #[tokio::test]
    async fn reply_reaches_a_waiting_request_once() {
        let harness = harness();
        let (sender, receiver) = oneshot::channel();
        let mut msg =
            CommandMsg::new(PluginHelper::new(&harness.context, "random"), command("u"), sender);

        assert_eq!(msg.reply_with(CommandResponse::in_channel("4")), ReplyStatus::Delivered);
        assert_eq!(msg.reply(None), ReplyStatus::AlreadyReplied);
        assert_eq!(receiver.await.expect("reply"), Some(CommandResponse::in_channel("4")));
    }

    #[tokio::test]
    async fn late_reply_goes_to_the_response_url() {
        let harness = harness();
        let (sender, receiver) = oneshot::channel();
        drop(receiver);
        let mut msg = CommandMsg::new(
            PluginHelper::new(&harness.context, "random"),
            command("https://hooks.slack.test/r/1"),
            sender,
        );

        assert_eq!(msg.reply_with(CommandResponse::ephemeral("late")), ReplyStatus::OutOfBand);

        let calls = harness.api.wait_for_calls(1).await;
        assert_eq!(
            calls,
            vec![Recorded::ResponseUrl {
                url: "https://hooks.slack.test/r/1".to_owned(),
                response: CommandResponse::ephemeral("late"),
            }]
        );
    }

    #[tokio::test]
    async fn late_empty_reply_is_abandoned() {
        let harness = harness();
        let (sender, receiver) = oneshot::channel();
        drop(receiver);
        let mut msg =
            CommandMsg::new(PluginHelper::new(&harness.context, "random"), command("u"), sender);

        assert_eq!(msg.reply(None), ReplyStatus::Abandoned);
    }

    #[test]
    fn webhook_request_lookups() {
        let request = WebhookRequest {
            method: "POST".to_owned(),
            query: vec![("token".to_owned(), "abc".to_owned())],
            headers: vec![("Content-Type".to_owned(), "text/plain".to_owned())],
            body: b"ping".to_vec(),
        };

        assert_eq!(request.query_param("token"), Some("abc"));
        assert_eq!(request.header("content-type"), Some("text/plain"));
        assert_eq!(request.body_text(), "ping");
    }
}
