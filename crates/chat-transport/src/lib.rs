//! # Chat Transport
//!
//! Streaming transport layer for AI chat clients.
//!
//! This crate provides two sibling connection managers that share one design:
//! a background task per client, a clone-able handle for control, and an
//! event stream for notifications.
//!
//! ## Features
//!
//! - **SSE over HTTP**: GET or POST requests with an incrementally parsed
//!   `text/event-stream` body, accumulated transcript, and `Last-Event-ID`
//!   resumption
//! - **WebSocket**: Full-duplex messaging with an application-level heartbeat
//! - **Recovery**: Exponential backoff with a ceiling, bounded attempts, and
//!   staleness detection on both transports
//! - **Observability**: Structured `tracing` logs at every lifecycle transition
//! - **Type Safety**: Decoded payloads as a JSON-or-raw sum type, never a panic
//!   on malformed input
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chat_transport::sse::{SseClient, SseClientEvent, SseConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SseConfig::new("https://api.example.com/v1/stream")
//!         .bearer_token("sk-...")
//!         .connect_timeout(std::time::Duration::from_secs(30));
//!
//!     let (handle, mut events) = SseClient::spawn(config)?.split();
//!     handle.connect().await;
//!
//!     while let Some(event) = events.next_event().await {
//!         if let SseClientEvent::Message(event) = event {
//!             println!("{}: {}", event.event_type, event.raw);
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod payload;
pub mod reconnect;
mod timer;

#[cfg(feature = "sse")]
pub mod sse;

#[cfg(feature = "websocket")]
pub mod websocket;

// Re-export commonly used types
pub use error::{TransportError, TransportResult};
pub use payload::Payload;
pub use reconnect::{ReconnectConfig, ReconnectDecision, ReconnectState, calculate_backoff};
#[cfg(feature = "sse")]
pub use sse::{SseClient, SseClientEvent, SseConfig, SseHandle, SseStatus, StreamEvent};
#[cfg(feature = "websocket")]
pub use websocket::{SocketMessage, WsClient, WsClientEvent, WsConfig, WsHandle, WsMessage, WsStatus};
