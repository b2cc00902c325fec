use serde_json::Value;

use crate::PayloadError;

const VIEW_SUBMISSION: &str = "view_submission";

/// An interactive callback (button press, modal submission, shortcut) posted as a `payload`
/// form field.
#[derive(Clone, Debug, PartialEq)]
pub struct InteractionCallback {
    pub interaction_type: String,
    pub callback_id: String,
    pub trigger_id: Option<String>,
    pub user_id: Option<String>,
    pub channel_id: Option<String>,
    pub response_url: Option<String>,
    /// The full decoded payload for handlers that need more than the routing fields.
    pub payload: Value,
}

impl InteractionCallback {
    pub fn from_form(body: &[u8]) -> Result<Self, PayloadError> {
        let raw = url::form_urlencoded::parse(body)
            .find(|(key, _)| key == "payload")
            .map(|(_, value)| value.into_owned())
            .ok_or(PayloadError::MissingField("payload"))?;
        let payload: Value =
            serde_json::from_str(&raw).map_err(|error| PayloadError::Json(error.to_string()))?;
        Self::from_value(payload)
    }

    pub fn from_value(payload: Value) -> Result<Self, PayloadError> {
        let interaction_type = str_at(&payload, &["type"])
            .filter(|kind| !kind.is_empty())
            .ok_or(PayloadError::MissingField("type"))?
            .to_owned();

        let callback_id = if interaction_type == VIEW_SUBMISSION {
            str_at(&payload, &["view", "callback_id"])
        } else {
            str_at(&payload, &["callback_id"])
        }
        .unwrap_or_default()
        .to_owned();

        Ok(Self {
            callback_id,
            trigger_id: str_at(&payload, &["trigger_id"]).map(str::to_owned),
            user_id: str_at(&payload, &["user", "id"]).map(str::to_owned),
            channel_id: str_at(&payload, &["channel", "id"]).map(str::to_owned),
            response_url: str_at(&payload, &["response_url"]).map(str::to_owned),
            interaction_type,
            payload,
        })
    }

    /// The part of the callback id before the first `-`, which names the handler.
    pub fn route_name(&self) -> &str {
        interaction_route(&self.callback_id)
    }
}

pub fn interaction_route(callback_id: &str) -> &str {
    callback_id.split_once('-').map_or(callback_id, |(prefix, _)| prefix)
}

fn str_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    path.iter().try_fold(value, |current, key| current.get(key))?.as_str()
}
