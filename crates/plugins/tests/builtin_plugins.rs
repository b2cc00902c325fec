use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hivebot_core::config::PluginsConfig;
use hivebot_core::{Channel, DirectoryCache, Identity, User};
use hivebot_db::InMemoryDataStore;
use hivebot_dispatch::{Bot, BotContext, CommandOutcome, DispatchSettings, RunningBot};
use hivebot_plugins::builtin_plugins;
use hivebot_slack::{
    ApiError, CommandResponse, EventPayload, OutgoingMessage, Page, SlackApi, SlashCommand,
};
use serde_json::{json, Value};
use tokio::sync::mpsc;

/// Forwards every posted message to the test.
struct PostedMessages {
    posted: mpsc::UnboundedSender<OutgoingMessage>,
}

#[async_trait]
impl SlackApi for PostedMessages {
    async fn auth_test(&self) -> Result<Identity, ApiError> {
        Ok(Identity { user_id: "UBOT".to_owned(), bot_id: None })
    }

    async fn list_channels(&self, _cursor: Option<&str>) -> Result<Page<Channel>, ApiError> {
        Ok(Page::default())
    }

    async fn list_users(&self, _cursor: Option<&str>) -> Result<Page<User>, ApiError> {
        Ok(Page::default())
    }

    async fn conversation_info(&self, channel_id: &str) -> Result<Channel, ApiError> {
        Ok(Channel { id: channel_id.to_owned(), ..Channel::default() })
    }

    async fn post_message(&self, message: &OutgoingMessage) -> Result<String, ApiError> {
        let _ = self.posted.send(message.clone());
        Ok("1700000000.000200".to_owned())
    }

    async fn post_ephemeral(
        &self,
        _user_id: &str,
        message: &OutgoingMessage,
    ) -> Result<(), ApiError> {
        let _ = self.posted.send(message.clone());
        Ok(())
    }

    async fn add_reaction(
        &self,
        _channel: &str,
        _ts: &str,
        _reaction: &str,
    ) -> Result<(), ApiError> {
        Ok(())
    }

    async fn open_view(&self, _trigger_id: &str, _view: &Value) -> Result<(), ApiError> {
        Ok(())
    }

    async fn post_response_url(
        &self,
        _response_url: &str,
        _response: &CommandResponse,
    ) -> Result<(), ApiError> {
        Ok(())
    }
}

async fn start() -> (RunningBot, mpsc::UnboundedReceiver<OutgoingMessage>) {
    let (posted, received) = mpsc::unbounded_channel();
    let directory = Arc::new(DirectoryCache::new());
    directory.set_identity(Identity { user_id: "UBOT".to_owned(), bot_id: None });
    directory.replace_all(
        vec![Channel { id: "C1".to_owned(), name: "general".to_owned(), ..Channel::default() }],
        vec![User { id: "U1".to_owned(), name: "jirwin".to_owned(), ..User::default() }],
    );
    let context = BotContext::new(
        Arc::new(PostedMessages { posted }),
        directory,
        Arc::new(InMemoryDataStore::new()),
    );

    let mut bot = Bot::new(context, DispatchSettings::default());
    for plugin in builtin_plugins(&PluginsConfig::default()) {
        bot.register(plugin).await.expect("register builtin");
    }
    (bot.start(), received)
}

fn command(name: &str, text: &str) -> SlashCommand {
    SlashCommand {
        name: name.to_owned(),
        text: text.to_owned(),
        channel_id: "C1".to_owned(),
        user_id: "U1".to_owned(),
        response_url: "https://hooks.slack.test/commands/1".to_owned(),
        ..SlashCommand::default()
    }
}

fn event(event: Value) -> EventPayload {
    let body = json!({ "type": "event_callback", "team_id": "T1", "event": event });
    EventPayload::parse(body.to_string().as_bytes()).expect("event payload")
}

#[tokio::test]
async fn karma_counts_messages_and_reports_scores() {
    let (running, _posted) = start().await;
    let message = event(json!({
        "type": "message",
        "channel": "C1",
        "user": "U1",
        "text": "rust++ jirwin++ great work jirwin++",
        "ts": "1.0",
    }));
    running.classifier().classify(message, "Ev1").await;

    let karma = running.context().store.plugin_store("karma");
    tokio::time::timeout(Duration::from_secs(2), async {
        while karma.get("jirwin").await.expect("get").as_deref() != Some(b"2".as_slice()) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("karma recorded");

    let outcome =
        running.correlator().dispatch_command(command("score", "jirwin")).await.expect("score");
    assert_eq!(
        outcome,
        CommandOutcome::Replied(CommandResponse::in_channel("Score for jirwin is 2"))
    );

    let outcome =
        running.correlator().dispatch_command(command("score", "nobody")).await.expect("score");
    assert_eq!(
        outcome,
        CommandOutcome::Replied(CommandResponse::in_channel("Score for nobody is 0"))
    );

    assert!(running.shutdown(Duration::from_secs(1)).await.drained);
}

#[tokio::test]
async fn echo_announces_reactions_by_user_name() {
    let (running, mut posted) = start().await;
    let reaction = event(json!({
        "type": "reaction_added",
        "user": "U1",
        "reaction": "tada",
        "item": { "type": "message", "channel": "C1", "ts": "1.0" },
    }));
    running.classifier().classify(reaction, "Ev2").await;

    let message = tokio::time::timeout(Duration::from_secs(2), posted.recv())
        .await
        .expect("announcement in time")
        .expect("announcement");
    assert_eq!(message.channel, "C1");
    assert_eq!(message.text, "@jirwin added a reaction! :tada:");

    assert!(running.shutdown(Duration::from_secs(1)).await.drained);
}

#[tokio::test]
async fn random_commands_reply_inline() {
    let (running, _posted) = start().await;

    let outcome =
        running.correlator().dispatch_command(command("choose", "tacos")).await.expect("choose");
    assert_eq!(
        outcome,
        CommandOutcome::Replied(CommandResponse::in_channel(
            "Well I guess I *have* to choose tacos."
        ))
    );

    let CommandOutcome::Replied(rolled) =
        running.correlator().dispatch_command(command("roll", "1")).await.expect("roll")
    else {
        panic!("roll should reply inline");
    };
    assert!(["You rolled a 0!", "You rolled a 1!"].contains(&rolled.text.as_str()));

    let outcome =
        running.correlator().dispatch_command(command("echo", "hello")).await.expect("echo");
    assert_eq!(outcome, CommandOutcome::Replied(CommandResponse::ephemeral("hello")));

    assert!(running.shutdown(Duration::from_secs(1)).await.drained);
}
