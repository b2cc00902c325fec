use std::sync::Arc;

use async_trait::async_trait;
use hivebot_core::Channel;
use hivebot_slack::events::{AppMentionEvent, MemberJoinedEvent, MessageEvent};
use hivebot_slack::{
    parse_mention_command, EventContext, EventPayload, EventSink, OutgoingMessage, SlackEvent,
    SlashCommand,
};
use tracing::{debug, info, warn};

use crate::context::BotContext;
use crate::correlator::ReplyCorrelator;
use crate::registry::PluginRegistry;

/// What the classifier did with an inbound event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Classification {
    /// A URL verification handshake; the intake must echo the challenge.
    Challenge(String),
    /// Handed to plugin handlers.
    Dispatched,
    /// Applied to the directory or answered by the bot itself.
    Handled,
    Ignored,
}

/// Turns Events API payloads into plugin dispatches and directory updates.
pub struct EventClassifier {
    context: BotContext,
    registry: Arc<PluginRegistry>,
    correlator: ReplyCorrelator,
}

impl EventClassifier {
    pub fn new(context: BotContext, correlator: ReplyCorrelator) -> Self {
        let registry = correlator.handle().registry().clone();
        Self { context, registry, correlator }
    }

    pub async fn classify(&self, payload: EventPayload, correlation_id: &str) -> Classification {
        let envelope = match payload {
            EventPayload::UrlVerification { challenge } => {
                info!(
                    event_name = "ingress.event.url_verification",
                    correlation_id,
                    "answering url verification challenge"
                );
                return Classification::Challenge(challenge);
            }
            EventPayload::EventCallback(envelope) => envelope,
            EventPayload::Unsupported => {
                debug!(correlation_id, "ignoring unsupported event payload");
                return Classification::Ignored;
            }
        };

        let kind = envelope.event.kind();
        debug!(event_name = "ingress.event.received", correlation_id, kind, "classifying event");

        match envelope.event {
            SlackEvent::Message(message) => self.on_message(message, correlation_id),
            SlackEvent::AppMention(mention) => {
                self.on_mention(&envelope.team_id, mention, correlation_id)
            }
            SlackEvent::ReactionAdded(reaction) => {
                self.registry.fan_out_reactions(&reaction);
                Classification::Dispatched
            }
            SlackEvent::MemberJoinedChannel(joined) => self.on_member_joined(joined).await,
            SlackEvent::ChannelCreated { channel } => self.on_channel_created(channel).await,
            SlackEvent::ChannelRename { channel } => {
                let mut known = self.context.directory.channel(&channel.id).unwrap_or_default();
                known.id = channel.id;
                known.name = channel.name;
                self.context.directory.upsert_channel(known);
                Classification::Handled
            }
            SlackEvent::UserChange { user } | SlackEvent::TeamJoin { user } => {
                self.context.directory.upsert_user(user);
                Classification::Handled
            }
            SlackEvent::Unsupported => {
                debug!(correlation_id, "ignoring unsupported event type");
                Classification::Ignored
            }
        }
    }

    fn on_message(&self, message: MessageEvent, correlation_id: &str) -> Classification {
        if self.context.directory.is_self(message.user.as_deref(), message.bot_id.as_deref()) {
            debug!(correlation_id, "ignoring the bot's own message");
            return Classification::Ignored;
        }
        let accepted = self.registry.fan_out_hooks(&message);
        debug!(
            event_name = "dispatch.hook.fan_out",
            correlation_id,
            accepted,
            "message offered to hooks"
        );
        Classification::Dispatched
    }

    fn on_mention(
        &self,
        team_id: &str,
        mention: AppMentionEvent,
        correlation_id: &str,
    ) -> Classification {
        let bot_user_id = self.context.directory.bot_user_id();
        let Some((name, text)) = parse_mention_command(&mention.text, &bot_user_id) else {
            return Classification::Ignored;
        };
        if self.registry.command(&name).is_none() {
            debug!(correlation_id, command = %name, "mention names no registered command");
            return Classification::Ignored;
        }

        let user_id = mention.user.unwrap_or_default();
        let channel = match self.context.directory.channel(&mention.channel) {
            Ok(channel) => channel,
            Err(error) => {
                warn!(
                    correlation_id,
                    command = %name,
                    error = %error,
                    "mention from unknown channel"
                );
                return Classification::Ignored;
            }
        };
        let user = match self.context.directory.user(&user_id) {
            Ok(user) => user,
            Err(error) => {
                warn!(
                    correlation_id,
                    command = %name,
                    error = %error,
                    "mention from unknown user"
                );
                return Classification::Ignored;
            }
        };

        info!(
            event_name = "dispatch.mention.received",
            correlation_id,
            command = %name,
            "dispatching mention command"
        );
        self.correlator.dispatch_mention(SlashCommand {
            name,
            text,
            team_id: team_id.to_owned(),
            channel_id: channel.id,
            channel_name: channel.name,
            user_id: user.id,
            user_name: user.name,
            response_url: String::new(),
            trigger_id: None,
        });
        Classification::Dispatched
    }

    async fn on_member_joined(&self, joined: MemberJoinedEvent) -> Classification {
        if joined.user != self.context.directory.bot_user_id() {
            return Classification::Ignored;
        }
        let text = match joined.inviter.as_deref().filter(|inviter| !inviter.is_empty()) {
            Some(inviter) => format!("Thanks for inviting me <@{inviter}>. I'm alive!"),
            None => "Thanks for inviting me. I'm alive!".to_owned(),
        };
        if let Err(error) =
            self.context.api.post_message(&OutgoingMessage::text(&joined.channel, text)).await
        {
            warn!(channel = %joined.channel, error = %error, "could not post welcome message");
        }
        Classification::Handled
    }

    async fn on_channel_created(&self, channel: Channel) -> Classification {
        let channel = match self.context.api.conversation_info(&channel.id).await {
            Ok(info) => info,
            Err(error) => {
                warn!(
                    channel = %channel.id,
                    error = %error,
                    "conversation info unavailable; caching the event's copy"
                );
                channel
            }
        };
        self.context.directory.upsert_channel(channel);
        Classification::Handled
    }
}

#[async_trait]
impl EventSink for EventClassifier {
    async fn handle_event(&self, payload: EventPayload, context: &EventContext) {
        self.classify(payload, &context.correlation_id).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use hivebot_core::Channel;
    use hivebot_slack::events::{AppMentionEvent, MemberJoinedEvent, MessageEvent};
    use hivebot_slack::{CallbackEnvelope, CommandResponse, EventPayload, SlackEvent};
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use super::{Classification, EventClassifier};
    use crate::correlator::ReplyCorrelator;
    use crate::dispatcher::dispatch_channel;
    use crate::messages::{CommandMsg, HookMsg};
    use crate::plugin::{Handler, Plugin};
    use crate::registry::PluginRegistry;
    use crate::test_support::{harness, Harness, Recorded};

    async fn classifier(harness: &Harness, plugins: Vec<Plugin>) -> EventClassifier {
        let mut registry = PluginRegistry::new(harness.context.clone(), 4);
        for plugin in plugins {
            registry.register(plugin).await.expect("register");
        }
        let (dispatcher, handle) = dispatch_channel(Arc::new(registry), 8);
        tokio::spawn(dispatcher.run(CancellationToken::new()));
        let correlator = ReplyCorrelator::new(
            handle,
            harness.api.clone(),
            Duration::from_millis(2_500),
            Duration::from_secs(5),
        );
        EventClassifier::new(harness.context.clone(), correlator)
    }

    fn callback(event: SlackEvent) -> EventPayload {
        EventPayload::EventCallback(CallbackEnvelope {
            team_id: "T1".to_owned(),
            event_id: Some("Ev1".to_owned()),
            event,
        })
    }

    #[tokio::test]
    async fn url_verification_echoes_the_challenge() {
        let harness = harness();
        let classifier = classifier(&harness, Vec::new()).await;

        let payload = EventPayload::UrlVerification { challenge: "abc123".to_owned() };

        assert_eq!(
            classifier.classify(payload, "c").await,
            Classification::Challenge("abc123".to_owned())
        );
    }

    #[tokio::test]
    async fn own_messages_skip_hooks() {
        let harness = harness();
        let (seen, mut observed) = mpsc::channel(4);
        let hook = Handler::anonymous(move |msg: HookMsg| {
            let seen = seen.clone();
            async move {
                let _ = seen.send(msg.message.text).await;
            }
        });
        let classifier = classifier(&harness, vec![Plugin::new("echo").hook(hook)]).await;

        let own = MessageEvent {
            channel: "C1".to_owned(),
            bot_id: Some("BBOT".to_owned()),
            text: "from me".to_owned(),
            ..MessageEvent::default()
        };
        let theirs = MessageEvent {
            channel: "C1".to_owned(),
            user: Some("U1".to_owned()),
            text: "from them".to_owned(),
            ..MessageEvent::default()
        };

        assert_eq!(
            classifier.classify(callback(SlackEvent::Message(own)), "c").await,
            Classification::Ignored
        );
        assert_eq!(
            classifier.classify(callback(SlackEvent::Message(theirs)), "c").await,
            Classification::Dispatched
        );
        assert_eq!(observed.recv().await.as_deref(), Some("from them"));
    }

    #[tokio::test]
    async fn mention_becomes_a_command_and_reply_is_posted() {
        let harness = harness();
        let roll = Handler::named("roll", |mut msg: CommandMsg| async move {
            let text = format!("{} rolled {}", msg.command.user_name, msg.command.text);
            msg.reply_with(CommandResponse::in_channel(text));
        });
        let classifier = classifier(&harness, vec![Plugin::new("random").command(roll)]).await;

        let mention = AppMentionEvent {
            channel: "C1".to_owned(),
            user: Some("U1".to_owned()),
            text: "<@UBOT> roll 2d6  fast".to_owned(),
            ts: "1.1".to_owned(),
            thread_ts: None,
        };
        assert_eq!(
            classifier.classify(callback(SlackEvent::AppMention(mention)), "c").await,
            Classification::Dispatched
        );

        let calls = harness.api.wait_for_calls(1).await;
        assert!(matches!(
            &calls[0],
            Recorded::Message(message)
                if message.channel == "C1" && message.text == "jirwin rolled 2d6  fast"
        ));
    }

    #[tokio::test]
    async fn mention_from_unknown_user_or_command_is_dropped() {
        let harness = harness();
        let roll = Handler::named("roll", |_msg: CommandMsg| async {});
        let classifier = classifier(&harness, vec![Plugin::new("random").command(roll)]).await;

        let stranger = AppMentionEvent {
            channel: "C1".to_owned(),
            user: Some("U404".to_owned()),
            text: "<@UBOT> roll".to_owned(),
            ..AppMentionEvent::default()
        };
        let unknown_command = AppMentionEvent {
            channel: "C1".to_owned(),
            user: Some("U1".to_owned()),
            text: "<@UBOT> dance".to_owned(),
            ..AppMentionEvent::default()
        };
        let not_addressed = AppMentionEvent {
            channel: "C1".to_owned(),
            user: Some("U1".to_owned()),
            text: "hey <@UBOT> roll".to_owned(),
            ..AppMentionEvent::default()
        };

        for mention in [stranger, unknown_command, not_addressed] {
            assert_eq!(
                classifier.classify(callback(SlackEvent::AppMention(mention)), "c").await,
                Classification::Ignored
            );
        }
    }

    #[tokio::test]
    async fn joining_a_channel_posts_a_welcome() {
        let harness = harness();
        let classifier = classifier(&harness, Vec::new()).await;
        let joined = MemberJoinedEvent {
            user: "UBOT".to_owned(),
            channel: "C1".to_owned(),
            inviter: Some("U1".to_owned()),
            channel_type: None,
        };

        classifier.classify(callback(SlackEvent::MemberJoinedChannel(joined)), "c").await;

        let calls = harness.api.calls();
        assert!(matches!(
            &calls[..],
            [Recorded::Message(message)]
                if message.text == "Thanks for inviting me <@U1>. I'm alive!"
        ));
    }

    #[tokio::test]
    async fn directory_events_update_the_cache() {
        let harness = harness();
        let classifier = classifier(&harness, Vec::new()).await;
        let created =
            Channel { id: "C7".to_owned(), name: "raw".to_owned(), ..Channel::default() };
        let renamed =
            Channel { id: "C1".to_owned(), name: "lobby".to_owned(), ..Channel::default() };

        classifier.classify(callback(SlackEvent::ChannelCreated { channel: created }), "c").await;
        classifier.classify(callback(SlackEvent::ChannelRename { channel: renamed }), "c").await;

        let directory = &harness.context.directory;
        assert_eq!(directory.channel("C7").expect("created").name, "from-api");
        let lobby = directory.channel("C1").expect("renamed");
        assert_eq!(lobby.name, "lobby");
        assert!(lobby.is_channel);
        assert!(directory.channel_id("general").is_err());
    }
}
