use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::events::EventPayload;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport read failed: {0}")]
    Receive(String),
    #[error("transport ack failed: {0}")]
    Acknowledge(String),
    #[error("transport disconnect failed: {0}")]
    Disconnect(String),
}

/// One socket-mode frame carrying an Events API payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SocketEnvelope {
    pub envelope_id: String,
    pub payload: EventPayload,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

/// Consumer of inbound event payloads, shared by the HTTP and socket-mode intakes.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn handle_event(&self, payload: EventPayload, context: &EventContext);
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let multiplier = 1_u64 << attempt.min(16);
        Duration::from_millis(self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms))
    }
}

#[async_trait]
pub trait SocketTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    async fn next_envelope(&self) -> Result<Option<SocketEnvelope>, TransportError>;
    async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

/// Placeholder transport whose stream is always empty.
#[derive(Default)]
pub struct NoopSocketTransport;

#[async_trait]
impl SocketTransport for NoopSocketTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn next_envelope(&self) -> Result<Option<SocketEnvelope>, TransportError> {
        Ok(None)
    }

    async fn acknowledge(&self, _envelope_id: &str) -> Result<(), TransportError> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

pub struct SocketModeRunner {
    transport: Arc<dyn SocketTransport>,
    sink: Arc<dyn EventSink>,
    reconnect_policy: ReconnectPolicy,
}

impl SocketModeRunner {
    pub fn new(
        transport: Arc<dyn SocketTransport>,
        sink: Arc<dyn EventSink>,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { transport, sink, reconnect_policy }
    }

    /// Pumps envelopes into the sink until the stream ends, retries run out, or `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        for attempt in 0..=self.reconnect_policy.max_retries {
            let outcome = tokio::select! {
                _ = cancel.cancelled() => {
                    info!(event_name = "ingress.socket.cancelled", "socket mode runner cancelled");
                    let _ = self.transport.disconnect().await;
                    return;
                }
                outcome = self.connect_and_pump(attempt) => outcome,
            };

            let Err(transport_error) = outcome else {
                return;
            };
            warn!(
                event_name = "ingress.socket.transport_failed",
                attempt,
                max_retries = self.reconnect_policy.max_retries,
                error = %transport_error,
                "socket mode transport failed"
            );

            if attempt >= self.reconnect_policy.max_retries {
                warn!(
                    max_retries = self.reconnect_policy.max_retries,
                    "socket mode retries exhausted; continuing with http intake only"
                );
                return;
            }

            let delay = self.reconnect_policy.backoff(attempt);
            if !delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    async fn connect_and_pump(&self, attempt: u32) -> Result<(), TransportError> {
        info!(attempt, "opening socket mode transport connection");
        self.transport.connect().await?;
        info!(attempt, "socket mode transport connected");

        loop {
            let Some(envelope) = self.transport.next_envelope().await? else {
                info!(attempt, "socket mode transport stream closed");
                self.transport.disconnect().await?;
                return Ok(());
            };

            info!(
                event_name = "ingress.socket.envelope_received",
                envelope_id = %envelope.envelope_id,
                correlation_id = %envelope.envelope_id,
                "received socket mode envelope"
            );

            // Slack redelivers anything not acknowledged within three seconds.
            if let Err(error) = self.transport.acknowledge(&envelope.envelope_id).await {
                warn!(
                    event_name = "ingress.socket.ack_failed",
                    envelope_id = %envelope.envelope_id,
                    correlation_id = %envelope.envelope_id,
                    error = %error,
                    "failed to acknowledge envelope"
                );
            } else {
                debug!(
                    event_name = "ingress.socket.ack_sent",
                    envelope_id = %envelope.envelope_id,
                    correlation_id = %envelope.envelope_id,
                    "acknowledged envelope"
                );
            }

            let context = EventContext { correlation_id: envelope.envelope_id.clone() };
            self.sink.handle_event(envelope.payload, &context).await;
        }
    }
}
