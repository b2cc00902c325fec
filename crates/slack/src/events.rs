use hivebot_core::{Channel, User};
use serde::Deserialize;

use crate::PayloadError;

/// Outer Events API body.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    UrlVerification {
        challenge: String,
    },
    EventCallback(CallbackEnvelope),
    #[serde(other)]
    Unsupported,
}

impl EventPayload {
    pub fn parse(body: &[u8]) -> Result<Self, PayloadError> {
        serde_json::from_slice(body).map_err(|error| PayloadError::Json(error.to_string()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct CallbackEnvelope {
    #[serde(default)]
    pub team_id: String,
    #[serde(default)]
    pub event_id: Option<String>,
    pub event: SlackEvent,
}

impl CallbackEnvelope {
    pub fn correlation_id(&self) -> &str {
        self.event_id.as_deref().unwrap_or("unknown-correlation-id")
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SlackEvent {
    Message(MessageEvent),
    AppMention(AppMentionEvent),
    ReactionAdded(ReactionAddedEvent),
    MemberJoinedChannel(MemberJoinedEvent),
    ChannelCreated { channel: Channel },
    ChannelRename { channel: Channel },
    UserChange { user: User },
    TeamJoin { user: User },
    #[serde(other)]
    Unsupported,
}

impl SlackEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Message(_) => "message",
            Self::AppMention(_) => "app_mention",
            Self::ReactionAdded(_) => "reaction_added",
            Self::MemberJoinedChannel(_) => "member_joined_channel",
            Self::ChannelCreated { .. } => "channel_created",
            Self::ChannelRename { .. } => "channel_rename",
            Self::UserChange { .. } => "user_change",
            Self::TeamJoin { .. } => "team_join",
            Self::Unsupported => "unsupported",
        }
    }
}

/// A posted message as seen by hooks.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct MessageEvent {
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub ts: String,
    #[serde(default)]
    pub thread_ts: Option<String>,
    #[serde(default)]
    pub bot_id: Option<String>,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct AppMentionEvent {
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub ts: String,
    #[serde(default)]
    pub thread_ts: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ReactionItem {
    #[serde(rename = "type", default)]
    pub item_type: String,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub ts: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ReactionAddedEvent {
    pub user: String,
    pub reaction: String,
    #[serde(default)]
    pub item_user: Option<String>,
    #[serde(default)]
    pub item: ReactionItem,
    #[serde(default)]
    pub event_ts: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct MemberJoinedEvent {
    pub user: String,
    pub channel: String,
    #[serde(default)]
    pub inviter: Option<String>,
    #[serde(default)]
    pub channel_type: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::{EventPayload, SlackEvent};
    use crate::PayloadError;

    #[test]
    fn parses_url_verification() {
        let payload = EventPayload::parse(
            br#"{"token":"t","challenge":"3eZbrw1aBm2rZgRNFdxV2595E9CY3gmdALWMmHkvFXO7tYXAYM8P","type":"url_verification"}"#,
        )
        .expect("parse");

        assert_eq!(
            payload,
            EventPayload::UrlVerification {
                challenge: "3eZbrw1aBm2rZgRNFdxV2595E9CY3gmdALWMmHkvFXO7tYXAYM8P".to_owned()
            }
        );
    }

    #[test]
    fn parses_message_callback() {
        let payload = EventPayload::parse(
            br#"{
                "type": "event_callback",
                "team_id": "T1",
                "event_id": "Ev1",
                "event": {
                    "type": "message",
                    "channel": "C1",
                    "user": "U1",
                    "text": "jirwin++",
                    "ts": "1355517523.000005"
                }
            }"#,
        )
        .expect("parse");

        let EventPayload::EventCallback(envelope) = payload else {
            panic!("expected callback envelope");
        };
        assert_eq!(envelope.correlation_id(), "Ev1");
        let SlackEvent::Message(message) = envelope.event else {
            panic!("expected message event");
        };
        assert_eq!(message.user.as_deref(), Some("U1"));
        assert_eq!(message.text, "jirwin++");
        assert_eq!(message.bot_id, None);
    }

    #[test]
    fn parses_directory_events() {
        let payload = EventPayload::parse(
            br#"{"type":"event_callback","event":{"type":"channel_rename","channel":{"id":"C1","name":"off-topic","created":1360782804}}}"#,
        )
        .expect("parse");
        let EventPayload::EventCallback(envelope) = payload else {
            panic!("expected callback envelope");
        };
        assert!(matches!(
            envelope.event,
            SlackEvent::ChannelRename { ref channel } if channel.name == "off-topic"
        ));

        let payload = EventPayload::parse(
            br#"{"type":"event_callback","event":{"type":"team_join","user":{"id":"U9","name":"newbie","real_name":"New Bie"}}}"#,
        )
        .expect("parse");
        let EventPayload::EventCallback(envelope) = payload else {
            panic!("expected callback envelope");
        };
        assert_eq!(envelope.event.kind(), "team_join");
    }

    #[test]
    fn unknown_event_types_are_unsupported_not_errors() {
        let payload = EventPayload::parse(
            br#"{"type":"event_callback","event":{"type":"pin_added","user":"U1"}}"#,
        )
        .expect("parse");
        let EventPayload::EventCallback(envelope) = payload else {
            panic!("expected callback envelope");
        };
        assert_eq!(envelope.event, SlackEvent::Unsupported);

        let payload = EventPayload::parse(br#"{"type":"app_rate_limited"}"#).expect("parse");
        assert_eq!(payload, EventPayload::Unsupported);
    }

    #[test]
    fn garbage_is_a_payload_error() {
        assert!(matches!(EventPayload::parse(b"not json"), Err(PayloadError::Json(_))));
    }
}
