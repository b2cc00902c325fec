use thiserror::Error;

/// Text posted back to the invoking user when a command cannot be answered.
pub const GENERIC_FAILURE_MESSAGE: &str = "Sorry. I was unable to complete your request. :cry:";

/// A request the HTTP intake refuses.
///
/// Rejections carry no user-facing text: the detail is logged under the correlation id and the
/// caller only sees the status code.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("request signature rejected: {message}")]
    Unauthorized { message: String, correlation_id: String },
    #[error("malformed payload: {message}")]
    MalformedPayload { message: String, correlation_id: String },
    #[error("dispatcher unavailable: {message}")]
    Unavailable { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn unauthorized(message: impl ToString, correlation_id: &str) -> Self {
        Self::Unauthorized { message: message.to_string(), correlation_id: correlation_id.into() }
    }

    pub fn malformed(message: impl ToString, correlation_id: &str) -> Self {
        Self::MalformedPayload {
            message: message.to_string(),
            correlation_id: correlation_id.into(),
        }
    }

    pub fn unavailable(message: impl ToString, correlation_id: &str) -> Self {
        Self::Unavailable { message: message.to_string(), correlation_id: correlation_id.into() }
    }

    /// Slack treats a 500 on an interaction as "payload not accepted", so malformed payloads
    /// map there rather than to 400.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Unauthorized { .. } => 401,
            Self::MalformedPayload { .. } => 500,
            Self::Unavailable { .. } => 503,
        }
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Unauthorized { .. } => "ingress.signature.rejected",
            Self::MalformedPayload { .. } => "ingress.payload.invalid",
            Self::Unavailable { .. } => "ingress.dispatch.unavailable",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::Unauthorized { correlation_id, .. }
            | Self::MalformedPayload { correlation_id, .. }
            | Self::Unavailable { correlation_id, .. } => correlation_id,
        }
    }
}
