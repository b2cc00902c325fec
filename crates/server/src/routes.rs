use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use hivebot_core::{InterfaceError, GENERIC_FAILURE_MESSAGE};
use hivebot_dispatch::{
    Classification, CommandOutcome, EventClassifier, ReplyCorrelator, RunningBot, WebhookOutcome,
    WebhookRequest, WebhookResponse,
};
use hivebot_slack::{
    CommandResponse, EventPayload, InteractionCallback, SignatureVerifier, SlashCommand,
    SIGNATURE_HEADER, TIMESTAMP_HEADER,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Everything the Slack intake handlers share.
#[derive(Clone)]
pub struct SlackState {
    correlator: ReplyCorrelator,
    classifier: Arc<EventClassifier>,
    verifier: Arc<SignatureVerifier>,
}

impl SlackState {
    pub fn new(bot: &RunningBot, verifier: SignatureVerifier) -> Self {
        Self {
            correlator: bot.correlator().clone(),
            classifier: bot.classifier().clone(),
            verifier: Arc::new(verifier),
        }
    }
}

pub fn router(state: SlackState) -> Router {
    Router::new()
        .route("/slack/command", post(slash_command))
        .route(
            "/slack/plugin/{webhook_name}",
            get(plugin_webhook).post(plugin_webhook).put(plugin_webhook).delete(plugin_webhook),
        )
        .route("/slack/interaction", post(interaction))
        .route("/slack/event", post(event))
        .with_state(state)
}

async fn slash_command(
    State(state): State<SlackState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let correlation_id = Uuid::new_v4().to_string();
    if let Err(rejection) = verify_signature(&state, &headers, &body, &correlation_id) {
        // Slack renders command bodies to the invoking user.
        log_rejection(&rejection);
        return failure_reply();
    }

    let command = match SlashCommand::from_form(&body) {
        Ok(command) => command,
        Err(error) => {
            warn!(
                event_name = "ingress.command.invalid",
                correlation_id = %correlation_id,
                error = %error,
                "could not parse slash command"
            );
            return failure_reply();
        }
    };
    if command.name.is_empty() {
        debug!(correlation_id = %correlation_id, "dropping slash command without a name");
        return empty_ok();
    }

    info!(
        event_name = "ingress.command.received",
        correlation_id = %correlation_id,
        command = %command.name,
        user_id = %command.user_id,
        channel_id = %command.channel_id,
        "received slash command"
    );

    match state.correlator.dispatch_command(command).await {
        Ok(CommandOutcome::Replied(response)) => Json(response.normalized()).into_response(),
        Ok(CommandOutcome::Deferred | CommandOutcome::TimedOut | CommandOutcome::Dropped) => {
            empty_ok()
        }
        Err(error) => {
            warn!(
                event_name = "ingress.command.rejected",
                correlation_id = %correlation_id,
                error = %error,
                "dispatcher refused slash command"
            );
            failure_reply()
        }
    }
}

async fn plugin_webhook(
    State(state): State<SlackState>,
    Path(webhook_name): Path<String>,
    method: Method,
    Query(query): Query<Vec<(String, String)>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let correlation_id = Uuid::new_v4().to_string();
    debug!(correlation_id = %correlation_id, webhook = %webhook_name, "received plugin webhook");
    let request = WebhookRequest {
        method: method.as_str().to_owned(),
        query,
        headers: headers
            .iter()
            .filter_map(|(name, value)| {
                value.to_str().ok().map(|value| (name.as_str().to_owned(), value.to_owned()))
            })
            .collect(),
        body: body.to_vec(),
    };

    match state.correlator.dispatch_webhook(&webhook_name, request).await {
        Ok(WebhookOutcome::Responded(response)) => webhook_reply(response),
        Ok(WebhookOutcome::Completed | WebhookOutcome::TimedOut) => empty_ok(),
        Err(error) => reject(InterfaceError::unavailable(error, &correlation_id)),
    }
}

async fn interaction(
    State(state): State<SlackState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let correlation_id = Uuid::new_v4().to_string();
    if let Err(rejection) = verify_signature(&state, &headers, &body, &correlation_id) {
        return reject(rejection);
    }

    let callback = match InteractionCallback::from_form(&body) {
        Ok(callback) => callback,
        Err(error) => return reject(InterfaceError::malformed(error, &correlation_id)),
    };

    info!(
        event_name = "ingress.interaction.received",
        correlation_id = %correlation_id,
        interaction_type = %callback.interaction_type,
        callback_id = %callback.callback_id,
        "received interaction"
    );
    match state.correlator.dispatch_interaction(callback).await {
        Ok(()) => empty_ok(),
        Err(error) => reject(InterfaceError::unavailable(error, &correlation_id)),
    }
}

async fn event(State(state): State<SlackState>, headers: HeaderMap, body: Bytes) -> Response {
    let request_id = Uuid::new_v4().to_string();
    if let Err(rejection) = verify_signature(&state, &headers, &body, &request_id) {
        return reject(rejection);
    }

    let payload = match EventPayload::parse(&body) {
        Ok(payload) => payload,
        Err(error) => {
            warn!(
                event_name = "ingress.event.invalid",
                correlation_id = %request_id,
                error = %error,
                "could not parse event payload"
            );
            return empty_ok();
        }
    };

    let correlation_id = match &payload {
        EventPayload::EventCallback(envelope) => envelope.correlation_id().to_owned(),
        _ => request_id,
    };
    match state.classifier.classify(payload, &correlation_id).await {
        Classification::Challenge(challenge) => {
            ([(header::CONTENT_TYPE, "text/plain")], challenge).into_response()
        }
        Classification::Dispatched | Classification::Handled | Classification::Ignored => {
            empty_ok()
        }
    }
}

fn verify_signature(
    state: &SlackState,
    headers: &HeaderMap,
    body: &[u8],
    correlation_id: &str,
) -> Result<(), InterfaceError> {
    let header = |name: &str| headers.get(name).and_then(|value| value.to_str().ok());
    state
        .verifier
        .verify(header(TIMESTAMP_HEADER), header(SIGNATURE_HEADER), body)
        .map_err(|error| InterfaceError::unauthorized(error, correlation_id))
}

fn log_rejection(error: &InterfaceError) {
    warn!(
        event_name = error.event_name(),
        correlation_id = error.correlation_id(),
        error = %error,
        "request rejected"
    );
}

/// Logs the rejection and answers with its bare status code.
fn reject(error: InterfaceError) -> Response {
    log_rejection(&error);
    StatusCode::from_u16(error.status_code())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
        .into_response()
}

fn webhook_reply(response: WebhookResponse) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::OK);
    match response.content_type {
        Some(content_type) => {
            (status, [(header::CONTENT_TYPE, content_type)], response.body).into_response()
        }
        None => (status, response.body).into_response(),
    }
}

fn failure_reply() -> Response {
    Json(CommandResponse::error(GENERIC_FAILURE_MESSAGE)).into_response()
}

fn empty_ok() -> Response {
    StatusCode::OK.into_response()
}
