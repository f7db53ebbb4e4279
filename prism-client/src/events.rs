//! Observability events for outbound requests
//!
//! Listeners subscribe to two independent broadcast streams:
//! - request events, one per request the client sends or refuses to send
//! - warnings, currently only the degraded-mode notice

use crate::error::ClientError;
use crate::metrics;
use crate::transport::Method;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::warn;
use uuid::Uuid;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// What was sent (or would have been sent)
#[derive(Debug, Clone, PartialEq)]
pub struct RequestMeta {
    pub method: Method,
    pub path: String,
    /// Response status, absent when no response was received
    pub status: Option<u16>,
}

/// Event fired once per outbound request
#[derive(Debug, Clone)]
pub struct RequestEvent {
    pub request_id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Set only when the gate rejected the request before it was sent
    pub error: Option<ClientError>,
    pub meta: RequestMeta,
}

/// Fan-out of client events to external listeners
///
/// Shared by every client in a lineage. Sending with no subscribers is not an
/// error.
pub struct EventEmitter {
    request_tx: broadcast::Sender<RequestEvent>,
    warning_tx: broadcast::Sender<String>,
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl EventEmitter {
    pub fn new() -> Self {
        let (request_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (warning_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            request_tx,
            warning_tx,
        }
    }

    /// Subscribe to request events
    pub fn subscribe(&self) -> broadcast::Receiver<RequestEvent> {
        self.request_tx.subscribe()
    }

    /// Subscribe to warnings
    pub fn subscribe_warnings(&self) -> broadcast::Receiver<String> {
        self.warning_tx.subscribe()
    }

    /// Emit a request event
    pub fn emit_request(&self, error: Option<ClientError>, meta: RequestMeta) {
        metrics::record_request(
            meta.method.as_str(),
            error.as_ref().map(ClientError::error_type),
        );

        let event = RequestEvent {
            request_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            error,
            meta,
        };
        let _ = self.request_tx.send(event);
    }

    /// Raise the degraded-mode notice
    ///
    /// The caller is responsible for firing this at most once per lineage.
    pub fn emit_degraded_notice(&self, message: &str) {
        warn!("{}", message);
        let _ = self.warning_tx.send(message.to_string());
    }
}
