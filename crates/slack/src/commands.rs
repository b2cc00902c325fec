use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::attachments::Attachment;
use crate::PayloadError;

/// One slash command invocation, either posted by Slack or synthesized from a mention.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SlashCommand {
    /// Command name without the leading `/`.
    pub name: String,
    pub text: String,
    pub team_id: String,
    pub channel_id: String,
    pub channel_name: String,
    pub user_id: String,
    pub user_name: String,
    /// Empty for mention-triggered commands.
    pub response_url: String,
    pub trigger_id: Option<String>,
}

impl SlashCommand {
    /// Parses the `application/x-www-form-urlencoded` body Slack posts for slash commands.
    pub fn from_form(body: &[u8]) -> Result<Self, PayloadError> {
        let mut fields: HashMap<String, String> =
            url::form_urlencoded::parse(body).into_owned().collect();

        let command = fields.remove("command").ok_or(PayloadError::MissingField("command"))?;
        let mut take = |key: &str| fields.remove(key).unwrap_or_default();

        Ok(Self {
            name: normalize_command_name(&command),
            text: take("text"),
            team_id: take("team_id"),
            channel_id: take("channel_id"),
            channel_name: take("channel_name"),
            user_id: take("user_id"),
            user_name: take("user_name"),
            response_url: take("response_url"),
            trigger_id: Some(take("trigger_id")).filter(|id| !id.is_empty()),
        })
    }

    pub fn is_mention(&self) -> bool {
        self.response_url.is_empty()
    }
}

pub fn normalize_command_name(raw: &str) -> String {
    raw.trim().trim_start_matches('/').to_owned()
}

/// Splits `<@BOT> name rest of text` into `(name, text)`.
///
/// Tokens are separated by single spaces, so the argument text keeps its inner spacing.
pub fn parse_mention_command(text: &str, bot_user_id: &str) -> Option<(String, String)> {
    if bot_user_id.is_empty() {
        return None;
    }
    let prefix = format!("<@{bot_user_id}> ");
    if !text.starts_with(&prefix) {
        return None;
    }

    let tokens: Vec<&str> = text.split(' ').collect();
    let name = tokens.get(1).filter(|name| !name.is_empty())?;
    Some(((*name).to_owned(), tokens.get(2..).unwrap_or_default().join(" ")))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    InChannel,
    Ephemeral,
}

/// Reply body for a slash command, posted in-band or to the response URL.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_type: Option<ResponseType>,
    /// Consulted only when `response_type` is unset.
    #[serde(skip)]
    pub in_channel: bool,
}

impl CommandResponse {
    pub fn ephemeral(text: impl Into<String>) -> Self {
        Self { text: text.into(), ..Self::default() }
    }

    pub fn in_channel(text: impl Into<String>) -> Self {
        Self { text: text.into(), in_channel: true, ..Self::default() }
    }

    /// An explicitly ephemeral message, used for user-facing failures.
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            response_type: Some(ResponseType::Ephemeral),
            ..Self::default()
        }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Fills `response_type` from `in_channel` unless one was set explicitly.
    pub fn normalize(&mut self) {
        if self.response_type.is_none() {
            self.response_type = Some(if self.in_channel {
                ResponseType::InChannel
            } else {
                ResponseType::Ephemeral
            });
        }
    }

    pub fn normalized(mut self) -> Self {
        self.normalize();
        self
    }

    pub fn is_in_channel(&self) -> bool {
        match self.response_type {
            Some(ResponseType::InChannel) => true,
            Some(ResponseType::Ephemeral) => false,
            None => self.in_channel,
        }
    }
}
