//! Slack platform boundary for hivebot.
//!
//! - **Signatures** (`signature`) - `v0` HMAC request verification
//! - **Slash commands** (`commands`) - form parsing, mention commands, reply bodies
//! - **Events** (`events`) - Events API payloads
//! - **Interactions** (`interactions`) - interactive callbacks and callback-id routing
//! - **Web API** (`api`) - the client trait plus a reqwest implementation
//! - **Socket Mode** (`socket`) - streaming intake with reconnection
//!
//! Nothing in this crate knows about plugins; the dispatch crate consumes these types.

use thiserror::Error;

pub mod api;
pub mod attachments;
pub mod commands;
pub mod directory;
pub mod events;
pub mod interactions;
pub mod signature;
pub mod socket;

pub use api::{ApiError, HttpSlackApi, NoopSlackApi, OutgoingMessage, Page, SlackApi};
pub use attachments::{Attachment, AttachmentField};
pub use commands::{parse_mention_command, CommandResponse, ResponseType, SlashCommand};
pub use directory::refresh_directory;
pub use events::{CallbackEnvelope, EventPayload, SlackEvent};
pub use interactions::{interaction_route, InteractionCallback};
pub use signature::{SignatureError, SignatureVerifier, SIGNATURE_HEADER, TIMESTAMP_HEADER};
pub use socket::{EventContext, EventSink, NoopSocketTransport, ReconnectPolicy, SocketModeRunner};

/// An inbound body that could not be turned into a typed payload.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("missing `{0}` field")]
    MissingField(&'static str),
    #[error("invalid json payload: {0}")]
    Json(String),
}
