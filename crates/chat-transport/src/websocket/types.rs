//! Core type definitions for WebSocket messaging.

use std::{
    fmt,
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use bytes::Bytes;

use crate::{error::TransportError, payload::Payload};

/// An application message as sent or received on the socket.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WsMessage {
    /// UTF-8 text frame.
    Text(String),
    /// Binary frame.
    Binary(Bytes),
}

impl WsMessage {
    /// Frame payload length in bytes.
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(bytes) => bytes.len(),
        }
    }

    /// Returns `true` for an empty payload.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The kind of frame this message travels in.
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Text(_) => MessageKind::Text,
            Self::Binary(_) => MessageKind::Binary,
        }
    }
}

impl From<String> for WsMessage {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for WsMessage {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<Bytes> for WsMessage {
    fn from(bytes: Bytes) -> Self {
        Self::Binary(bytes)
    }
}

impl From<Vec<u8>> for WsMessage {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Binary(Bytes::from(bytes))
    }
}

/// Classification of inbound frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageKind {
    /// Text frame.
    Text,
    /// Binary frame.
    Binary,
}

impl MessageKind {
    /// Returns true for text frames.
    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text)
    }

    /// Returns true for binary frames.
    pub fn is_binary(&self) -> bool {
        matches!(self, Self::Binary)
    }
}

/// An inbound message, decoded and timestamped.
#[derive(Clone, Debug, PartialEq)]
pub struct SocketMessage {
    /// JSON when the text frame parsed, otherwise the raw text or bytes.
    pub data: Payload,
    /// The frame exactly as received.
    pub raw: WsMessage,
    /// Frame kind.
    pub kind: MessageKind,
    /// Wall-clock receive time, milliseconds since the Unix epoch.
    pub received_at_ms: u64,
}

impl SocketMessage {
    pub(crate) fn new(raw: WsMessage, parse_json: bool) -> Self {
        let data = match &raw {
            WsMessage::Text(text) => Payload::from_text(text, parse_json),
            WsMessage::Binary(bytes) => Payload::from_binary(bytes.clone()),
        };
        Self {
            data,
            kind: raw.kind(),
            raw,
            received_at_ms: now_ms(),
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis() as u64)
}

/// WebSocket connection state machine states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WsStatus {
    /// Created, never connected.
    Idle,
    /// Opening handshake in progress.
    Connecting,
    /// Socket open; messages flow both ways.
    Connected,
    /// Close handshake started by `disconnect`.
    Closing,
    /// Socket closed.
    Closed,
    /// A connection attempt failed.
    Error,
    /// Waiting out a backoff delay.
    Reconnecting {
        /// Current reconnection attempt number.
        attempt: u32,
        /// Delay before the attempt.
        delay: Duration,
    },
}

impl WsStatus {
    /// Returns `true` if messages can be sent.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Returns `true` while a socket is open or opening.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }
}

impl fmt::Display for WsStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Closing => write!(f, "closing"),
            Self::Closed => write!(f, "closed"),
            Self::Error => write!(f, "error"),
            Self::Reconnecting { attempt, .. } => write!(f, "reconnecting({attempt})"),
        }
    }
}

/// Notifications produced by a WebSocket client, in the order they happened.
#[derive(Clone, Debug)]
pub enum WsClientEvent {
    /// The status changed.
    StatusChanged(WsStatus),
    /// The socket opened.
    Open,
    /// A message arrived.
    Message(SocketMessage),
    /// A transport error occurred.
    Error(Arc<TransportError>),
    /// The socket closed.
    Closed {
        /// Close code, when one was exchanged.
        code: Option<u16>,
        /// Close reason.
        reason: String,
        /// `false` for abnormal closures, which are eligible for reconnection.
        was_clean: bool,
    },
    /// A reconnect is scheduled.
    Reconnecting {
        /// Attempt number, starting at 1.
        attempt: u32,
        /// Delay before the attempt.
        delay: Duration,
    },
    /// No attempts are left; call `connect()` to start over.
    MaxReconnectAttemptsReached,
    /// No frame arrived within the heartbeat timeout.
    HeartbeatFailed,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_text_message_decodes_json() {
        let message = SocketMessage::new(WsMessage::from(r#"{"type":"delta","text":"Hi"}"#), true);
        assert_eq!(message.kind, MessageKind::Text);
        assert_eq!(message.data, Payload::Json(json!({"type": "delta", "text": "Hi"})));
        assert!(message.received_at_ms > 0);
    }

    #[test]
    fn test_text_message_falls_back_to_raw() {
        let message = SocketMessage::new(WsMessage::from("{not json"), true);
        assert_eq!(message.data, Payload::Text("{not json".to_string()));

        let message = SocketMessage::new(WsMessage::from("42"), false);
        assert_eq!(message.data, Payload::Text("42".to_string()));
    }

    #[test]
    fn test_binary_message_is_kept_as_is() {
        let message = SocketMessage::new(WsMessage::from(vec![0u8, 159, 146, 150]), true);
        assert!(message.kind.is_binary());
        assert_eq!(
            message.data,
            Payload::Binary(Bytes::from_static(&[0, 159, 146, 150]))
        );
        assert_eq!(message.raw.len(), 4);
    }

    #[test]
    fn test_status_predicates() {
        assert!(WsStatus::Connected.is_connected());
        assert!(WsStatus::Connected.is_active());
        assert!(WsStatus::Connecting.is_active());
        assert!(!WsStatus::Connecting.is_connected());
        assert!(!WsStatus::Closing.is_active());
        assert!(
            !WsStatus::Reconnecting {
                attempt: 1,
                delay: Duration::from_secs(1)
            }
            .is_active()
        );
    }

    #[test]
    fn test_status_display() {
        assert_eq!(WsStatus::Closing.to_string(), "closing");
        assert_eq!(
            WsStatus::Reconnecting {
                attempt: 3,
                delay: Duration::from_secs(4)
            }
            .to_string(),
            "reconnecting(3)"
        );
    }
}
