//! Error handling for the streaming transports.

use std::time::Duration;

use thiserror::Error;

/// The main result type used throughout the transport layer.
pub type TransportResult<T> = Result<T, TransportError>;

/// Error type for all transport operations.
///
/// Transport and staleness errors never cross the public client API as
/// `Err` values. They are reported through client events and the
/// `last_error()` accessors, wrapped in an `Arc` so every observer can hold
/// a copy.
#[derive(Error, Debug)]
pub enum TransportError {
    /// HTTP request errors (wraps reqwest::Error)
    #[cfg(feature = "sse")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The SSE endpoint answered with a non-success status.
    #[error("SSE endpoint returned status {status}")]
    SseInvalidStatus { status: http::StatusCode },

    /// WebSocket errors
    #[error("WebSocket error: {message}")]
    WebSocket { message: String },

    /// The connection was closed by the peer or the transport.
    #[error("Connection closed: {}", reason.as_deref().unwrap_or("no reason given"))]
    ConnectionClosed { reason: Option<String> },

    /// No data (SSE) or no frame after a heartbeat ping (WebSocket) arrived in time.
    #[error("Connection stale: no data received for {idle:?}")]
    Stale { idle: Duration },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Timeout errors
    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },
}

#[cfg(feature = "websocket")]
impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket {
            message: e.to_string(),
        }
    }
}

impl TransportError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a WebSocket error.
    pub fn websocket(message: impl Into<String>) -> Self {
        Self::WebSocket {
            message: message.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout { duration }
    }

    /// Create a staleness error.
    pub fn stale(idle: Duration) -> Self {
        Self::Stale { idle }
    }

    /// Create a connection-closed error.
    pub fn connection_closed(reason: Option<String>) -> Self {
        Self::ConnectionClosed { reason }
    }

    /// Create an error for a non-success SSE response status.
    pub fn sse_invalid_status(status: http::StatusCode) -> Self {
        Self::SseInvalidStatus { status }
    }

    /// Returns `true` for silence and heartbeat timeouts.
    pub fn is_staleness(&self) -> bool {
        matches!(self, Self::Stale { .. })
    }
}
