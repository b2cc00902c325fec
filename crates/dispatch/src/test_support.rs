use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use hivebot_core::{Channel, DirectoryCache, Identity, User};
use hivebot_db::InMemoryDataStore;
use hivebot_slack::{ApiError, CommandResponse, OutgoingMessage, Page, SlackApi};
use serde_json::Value;
use tokio::sync::Notify;

use crate::context::BotContext;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Recorded {
    Message(OutgoingMessage),
    Ephemeral { user_id: String, message: OutgoingMessage },
    Reaction { channel: String, ts: String, reaction: String },
    View { trigger_id: String },
    ResponseUrl { url: String, response: CommandResponse },
}

/// Slack client double that records outbound calls.
#[derive(Default)]
pub struct RecordingSlackApi {
    calls: Mutex<Vec<Recorded>>,
    changed: Notify,
}

impl RecordingSlackApi {
    pub fn calls(&self) -> Vec<Recorded> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub async fn wait_for_calls(&self, count: usize) -> Vec<Recorded> {
        loop {
            let calls = self.calls();
            if calls.len() >= count {
                return calls;
            }
            self.changed.notified().await;
        }
    }

    fn record(&self, call: Recorded) {
        self.calls.lock().expect("calls lock").push(call);
        self.changed.notify_one();
    }
}

#[async_trait]
impl SlackApi for RecordingSlackApi {
    async fn auth_test(&self) -> Result<Identity, ApiError> {
        Ok(Identity { user_id: "UBOT".to_owned(), bot_id: Some("BBOT".to_owned()) })
    }

    async fn list_channels(&self, _cursor: Option<&str>) -> Result<Page<Channel>, ApiError> {
        Ok(Page::default())
    }

    async fn list_users(&self, _cursor: Option<&str>) -> Result<Page<User>, ApiError> {
        Ok(Page::default())
    }

    async fn conversation_info(&self, channel_id: &str) -> Result<Channel, ApiError> {
        Ok(Channel {
            id: channel_id.to_owned(),
            name: "from-api".to_owned(),
            is_channel: true,
            is_private: false,
        })
    }

    async fn post_message(&self, message: &OutgoingMessage) -> Result<String, ApiError> {
        self.record(Recorded::Message(message.clone()));
        Ok("1700000000.000100".to_owned())
    }

    async fn post_ephemeral(
        &self,
        user_id: &str,
        message: &OutgoingMessage,
    ) -> Result<(), ApiError> {
        self.record(Recorded::Ephemeral { user_id: user_id.to_owned(), message: message.clone() });
        Ok(())
    }

    async fn add_reaction(&self, channel: &str, ts: &str, reaction: &str) -> Result<(), ApiError> {
        self.record(Recorded::Reaction {
            channel: channel.to_owned(),
            ts: ts.to_owned(),
            reaction: reaction.to_owned(),
        });
        Ok(())
    }

    async fn open_view(&self, trigger_id: &str, _view: &Value) -> Result<(), ApiError> {
        self.record(Recorded::View { trigger_id: trigger_id.to_owned() });
        Ok(())
    }

    async fn post_response_url(
        &self,
        response_url: &str,
        response: &CommandResponse,
    ) -> Result<(), ApiError> {
        self.record(Recorded::ResponseUrl {
            url: response_url.to_owned(),
            response: response.clone(),
        });
        Ok(())
    }
}

pub struct Harness {
    pub context: BotContext,
    pub api: Arc<RecordingSlackApi>,
}

/// A context over a recording Slack client, an in-memory store, and a directory that knows the
/// bot as `UBOT`/`BBOT`, channel `C1` (#general) and user `U1` (jirwin).
pub fn harness() -> Harness {
    let api = Arc::new(RecordingSlackApi::default());
    let directory = Arc::new(DirectoryCache::new());
    directory
        .set_identity(Identity { user_id: "UBOT".to_owned(), bot_id: Some("BBOT".to_owned()) });
    directory.replace_all(
        vec![Channel {
            id: "C1".to_owned(),
            name: "general".to_owned(),
            is_channel: true,
            is_private: false,
        }],
        vec![User { id: "U1".to_owned(), name: "jirwin".to_owned(), ..User::default() }],
    );
    let context =
        BotContext::new(api.clone(), directory, Arc::new(InMemoryDataStore::new()));
    Harness { context, api }
}
