use std::time::Duration;

use async_trait::async_trait;
use hivebot_core::{Channel, Identity, User};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::attachments::Attachment;
use crate::commands::CommandResponse;

const PAGE_LIMIT: &str = "200";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("slack http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("slack api `{method}` returned error `{error}`")]
    Slack { method: String, error: String },
    #[error("slack api `{method}` returned an unreadable body: {detail}")]
    Decode { method: String, detail: String },
    #[error("response url rejected the reply with status {0}")]
    ResponseUrl(u16),
}

/// A message posted through `chat.postMessage` or `chat.postEphemeral`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct OutgoingMessage {
    pub channel: String,
    pub text: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
}

impl OutgoingMessage {
    pub fn text(channel: impl Into<String>, text: impl Into<String>) -> Self {
        Self { channel: channel.into(), text: text.into(), ..Self::default() }
    }

    pub fn from_response(channel: impl Into<String>, response: &CommandResponse) -> Self {
        Self {
            channel: channel.into(),
            text: response.text.clone(),
            attachments: response.attachments.clone(),
            thread_ts: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

/// The subset of the Slack Web API the bot uses.
#[async_trait]
pub trait SlackApi: Send + Sync {
    async fn auth_test(&self) -> Result<Identity, ApiError>;

    async fn list_channels(&self, cursor: Option<&str>) -> Result<Page<Channel>, ApiError>;

    async fn list_users(&self, cursor: Option<&str>) -> Result<Page<User>, ApiError>;

    async fn conversation_info(&self, channel_id: &str) -> Result<Channel, ApiError>;

    /// Returns the timestamp of the posted message.
    async fn post_message(&self, message: &OutgoingMessage) -> Result<String, ApiError>;

    async fn post_ephemeral(&self, user_id: &str, message: &OutgoingMessage)
        -> Result<(), ApiError>;

    async fn add_reaction(&self, channel: &str, ts: &str, reaction: &str) -> Result<(), ApiError>;

    async fn open_view(&self, trigger_id: &str, view: &Value) -> Result<(), ApiError>;

    async fn post_response_url(
        &self,
        response_url: &str,
        response: &CommandResponse,
    ) -> Result<(), ApiError>;
}

/// Accepts every call without reaching Slack.
#[derive(Default)]
pub struct NoopSlackApi;

#[async_trait]
impl SlackApi for NoopSlackApi {
    async fn auth_test(&self) -> Result<Identity, ApiError> {
        Ok(Identity::default())
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

    async fn post_message(&self, _message: &OutgoingMessage) -> Result<String, ApiError> {
        Ok(String::new())
    }

    async fn post_ephemeral(
        &self,
        _user_id: &str,
        _message: &OutgoingMessage,
    ) -> Result<(), ApiError> {
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

/// Web API client over reqwest using the bot token.
#[derive(Clone)]
pub struct HttpSlackApi {
    client: Client,
    base_url: String,
    bot_token: SecretString,
}

#[derive(Deserialize)]
struct Envelope {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(flatten)]
    body: Value,
}

#[derive(Deserialize, Default)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: String,
}

#[derive(Deserialize)]
struct ChannelList {
    #[serde(default)]
    channels: Vec<Channel>,
    #[serde(default)]
    response_metadata: ResponseMetadata,
}

#[derive(Deserialize)]
struct UserList {
    #[serde(default)]
    members: Vec<User>,
    #[serde(default)]
    response_metadata: ResponseMetadata,
}

#[derive(Deserialize)]
struct ChannelInfo {
    channel: Channel,
}

#[derive(Deserialize)]
struct AuthTest {
    user_id: String,
    #[serde(default)]
    bot_id: Option<String>,
}

#[derive(Deserialize)]
struct Posted {
    #[serde(default)]
    ts: String,
}

fn next_cursor(metadata: ResponseMetadata) -> Option<String> {
    Some(metadata.next_cursor).filter(|cursor| !cursor.is_empty())
}

impl HttpSlackApi {
    pub fn new(base_url: impl Into<String>, bot_token: SecretString) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self { client, base_url: base_url.into().trim_end_matches('/').to_owned(), bot_token })
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{method}", self.base_url)
    }

    fn unwrap<T: DeserializeOwned>(method: &str, envelope: Envelope) -> Result<T, ApiError> {
        if !envelope.ok {
            return Err(ApiError::Slack {
                method: method.to_owned(),
                error: envelope.error.unwrap_or_else(|| "unknown_error".to_owned()),
            });
        }
        serde_json::from_value(envelope.body).map_err(|error| ApiError::Decode {
            method: method.to_owned(),
            detail: error.to_string(),
        })
    }

    async fn call_form<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &[(&str, &str)],
    ) -> Result<T, ApiError> {
        let envelope: Envelope = self
            .client
            .post(self.url(method))
            .bearer_auth(self.bot_token.expose_secret())
            .form(params)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Self::unwrap(method, envelope)
    }

    async fn call_json<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        method: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let envelope: Envelope = self
            .client
            .post(self.url(method))
            .bearer_auth(self.bot_token.expose_secret())
            .json(body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Self::unwrap(method, envelope)
    }
}

#[async_trait]
impl SlackApi for HttpSlackApi {
    async fn auth_test(&self) -> Result<Identity, ApiError> {
        let auth: AuthTest = self.call_form("auth.test", &[]).await?;
        Ok(Identity { user_id: auth.user_id, bot_id: auth.bot_id })
    }

    async fn list_channels(&self, cursor: Option<&str>) -> Result<Page<Channel>, ApiError> {
        let mut params = vec![
            ("limit", PAGE_LIMIT),
            ("exclude_archived", "true"),
            ("types", "public_channel,private_channel"),
        ];
        if let Some(cursor) = cursor {
            params.push(("cursor", cursor));
        }
        let list: ChannelList = self.call_form("conversations.list", &params).await?;
        Ok(Page { items: list.channels, next_cursor: next_cursor(list.response_metadata) })
    }

    async fn list_users(&self, cursor: Option<&str>) -> Result<Page<User>, ApiError> {
        let mut params = vec![("limit", PAGE_LIMIT)];
        if let Some(cursor) = cursor {
            params.push(("cursor", cursor));
        }
        let list: UserList = self.call_form("users.list", &params).await?;
        Ok(Page { items: list.members, next_cursor: next_cursor(list.response_metadata) })
    }

    async fn conversation_info(&self, channel_id: &str) -> Result<Channel, ApiError> {
        let info: ChannelInfo =
            self.call_form("conversations.info", &[("channel", channel_id)]).await?;
        Ok(info.channel)
    }

    async fn post_message(&self, message: &OutgoingMessage) -> Result<String, ApiError> {
        let posted: Posted = self.call_json("chat.postMessage", message).await?;
        Ok(posted.ts)
    }

    async fn post_ephemeral(
        &self,
        user_id: &str,
        message: &OutgoingMessage,
    ) -> Result<(), ApiError> {
        #[derive(Serialize)]
        struct Ephemeral<'a> {
            user: &'a str,
            #[serde(flatten)]
            message: &'a OutgoingMessage,
        }

        let _: Value =
            self.call_json("chat.postEphemeral", &Ephemeral { user: user_id, message }).await?;
        Ok(())
    }

    async fn add_reaction(&self, channel: &str, ts: &str, reaction: &str) -> Result<(), ApiError> {
        let name = reaction.trim_matches(':');
        let _: Value = self
            .call_form("reactions.add", &[("channel", channel), ("timestamp", ts), ("name", name)])
            .await?;
        Ok(())
    }

    async fn open_view(&self, trigger_id: &str, view: &Value) -> Result<(), ApiError> {
        let body = serde_json::json!({ "trigger_id": trigger_id, "view": view });
        let _: Value = self.call_json("views.open", &body).await?;
        Ok(())
    }

    async fn post_response_url(
        &self,
        response_url: &str,
        response: &CommandResponse,
    ) -> Result<(), ApiError> {
        let reply = response.clone().normalized();
        let status = self.client.post(response_url).json(&reply).send().await?.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ApiError::ResponseUrl(status.as_u16()))
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{Envelope, HttpSlackApi, OutgoingMessage, UserList};
    use crate::attachments::Attachment;
    use crate::commands::CommandResponse;
    use crate::ApiError;

    #[test]
    fn failed_envelope_surfaces_slack_error() {
        let envelope: Envelope =
            serde_json::from_value(json!({"ok": false, "error": "channel_not_found"}))
                .expect("decode envelope");

        let outcome = HttpSlackApi::unwrap::<serde_json::Value>("chat.postMessage", envelope);
        assert!(matches!(
            outcome,
            Err(ApiError::Slack { ref error, .. }) if error == "channel_not_found"
        ));
    }

    #[test]
    fn user_page_decodes_members_and_cursor() {
        let envelope: Envelope = serde_json::from_value(json!({
            "ok": true,
            "members": [{"id": "U1", "name": "jirwin", "is_bot": false}],
            "response_metadata": {"next_cursor": "dXNlcjpVMEc5V0ZYTlo="}
        }))
        .expect("decode envelope");

        let list: UserList = HttpSlackApi::unwrap("users.list", envelope).expect("unwrap");
        assert_eq!(list.members[0].name, "jirwin");
        assert_eq!(
            super::next_cursor(list.response_metadata).as_deref(),
            Some("dXNlcjpVMEc5V0ZYTlo=")
        );
    }

    #[test]
    fn outgoing_message_copies_response_content() {
        let response =
            CommandResponse::in_channel("rolled 4").with_attachment(Attachment::new("4"));
        let message = OutgoingMessage::from_response("C1", &response);

        let json = serde_json::to_value(&message).expect("serialize");
        assert_eq!(json["channel"], "C1");
        assert_eq!(json["attachments"][0]["fallback"], "4");
        assert!(json.get("thread_ts").is_none());
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let api = HttpSlackApi::new("https://slack.com/api/", "xoxb-test".to_owned().into())
            .expect("build client");
        assert_eq!(api.url("auth.test"), "https://slack.com/api/auth.test");
    }
}
