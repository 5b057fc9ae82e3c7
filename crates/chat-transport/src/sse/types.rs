//! Core type definitions for SSE event handling.

use std::{fmt, sync::Arc, time::Duration};

use super::parse::SseRecord;
use crate::{error::TransportError, payload::Payload};

/// An assembled server-sent event.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamEvent {
    /// Event type (`"message"` unless the server named one).
    pub event_type: String,
    /// Data decoded as JSON, or the raw text.
    pub data: Payload,
    /// The raw data string, exactly as assembled from `data:` lines.
    pub raw: String,
    /// Event id, when the record carried one.
    pub id: Option<String>,
    /// Server reconnect hint carried by the record.
    pub retry: Option<Duration>,
}

impl StreamEvent {
    pub(crate) fn from_record(record: SseRecord, parse_json: bool) -> Self {
        Self {
            event_type: record.event_type,
            data: Payload::from_text(&record.data, parse_json),
            raw: record.data,
            id: record.id,
            retry: record.retry,
        }
    }
}

/// SSE connection state machine states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SseStatus {
    /// Created, never connected.
    Idle,
    /// Request issued, waiting for the response head.
    Connecting,
    /// Response accepted, no body bytes yet.
    Connected,
    /// Receiving body bytes.
    Streaming,
    /// Waiting out a backoff delay.
    Reconnecting {
        /// Current reconnection attempt number.
        attempt: u32,
        /// Delay before the attempt.
        delay: Duration,
    },
    /// The last connection attempt failed.
    Error,
    /// Stream ended or the caller disconnected.
    Closed,
}

impl SseStatus {
    /// Returns `true` while a request is in flight or streaming.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Connecting | Self::Connected | Self::Streaming)
    }

    /// Returns `true` once the stream has delivered bytes.
    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming)
    }
}

impl fmt::Display for SseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Streaming => write!(f, "streaming"),
            Self::Reconnecting { attempt, .. } => write!(f, "reconnecting({attempt})"),
            Self::Error => write!(f, "error"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Notifications produced by an SSE client, in the order they happened.
#[derive(Clone, Debug)]
pub enum SseClientEvent {
    /// The status changed.
    StatusChanged(SseStatus),
    /// The response was accepted.
    Open,
    /// A complete event arrived.
    Message(StreamEvent),
    /// A transport or staleness error occurred.
    Error(Arc<TransportError>),
    /// A reconnect is scheduled.
    Reconnecting {
        /// Attempt number, starting at 1.
        attempt: u32,
        /// Delay before the attempt.
        delay: Duration,
    },
    /// No attempts are left; call `connect()` to start over.
    MaxReconnectAttemptsReached,
    /// The stream ended normally or the caller disconnected.
    Closed,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_event_from_record_decodes_json() {
        let record = SseRecord {
            event_type: "delta".to_string(),
            data: r#"{"content":"Hi"}"#.to_string(),
            id: Some("evt-1".to_string()),
            retry: None,
        };
        let event = StreamEvent::from_record(record, true);
        assert_eq!(event.event_type, "delta");
        assert_eq!(event.data, Payload::Json(json!({"content": "Hi"})));
        assert_eq!(event.raw, r#"{"content":"Hi"}"#);
        assert_eq!(event.id.as_deref(), Some("evt-1"));
    }

    #[test]
    fn test_event_from_record_keeps_raw_text() {
        let record = SseRecord {
            event_type: "message".to_string(),
            data: "hello".to_string(),
            id: None,
            retry: Some(Duration::from_secs(3)),
        };
        let event = StreamEvent::from_record(record, true);
        assert_eq!(event.data, Payload::Text("hello".to_string()));
        assert_eq!(event.raw, "hello");
        assert_eq!(event.retry, Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_status_predicates() {
        assert!(SseStatus::Connecting.is_active());
        assert!(SseStatus::Connected.is_active());
        assert!(SseStatus::Streaming.is_active());
        assert!(SseStatus::Streaming.is_streaming());
        assert!(!SseStatus::Idle.is_active());
        assert!(!SseStatus::Error.is_active());
        assert!(
            !SseStatus::Reconnecting {
                attempt: 1,
                delay: Duration::from_secs(1)
            }
            .is_active()
        );
    }

    #[test]
    fn test_status_display() {
        assert_eq!(SseStatus::Streaming.to_string(), "streaming");
        assert_eq!(
            SseStatus::Reconnecting {
                attempt: 2,
                delay: Duration::from_secs(2)
            }
            .to_string(),
            "reconnecting(2)"
        );
    }
}
