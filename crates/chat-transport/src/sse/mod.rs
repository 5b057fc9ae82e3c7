//! Server-Sent Events (SSE) transport for streamed chat responses.
//!
//! This module provides an SSE client with support for:
//!
//! - **Incremental Parsing**: `text/event-stream` framing is parsed from the
//!   raw body as it arrives, independent of how the bytes are chunked.
//! - **Auto-Reconnection**: Exponential backoff with a ceiling, bounded
//!   attempts, server `retry:` overrides, and `Last-Event-ID` resumption.
//! - **Staleness Detection**: A silence window that treats a quiet stream
//!   like a network error.
//! - **Client/Handle/Events Split**: Mirrors the WebSocket module's
//!   `WsClient` pattern. Spawn a background
//!   task, then interact via clone-able [`SseHandle`] and consumable
//!   [`SseEvents`].
//!
//! # Architecture
//!
//! ```text
//! SseClient::spawn(config)
//!   └─ spawns background task ──► tokio::spawn(SseDriver::run)
//!        │                              │
//!        ├── SseHandle ◄─── mpsc ◄──────┤  (commands: Connect, Disconnect, Reconnect, Reset)
//!        │       └──── watch + buffers ─┤  (status, events, transcript, last id, last error)
//!        │                              │
//!        └── SseEvents ◄── unbounded ◄──┘  (SseClientEvent items)
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use chat_transport::sse::{SseClient, SseClientEvent, SseConfig};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SseConfig::new("https://api.example.com/v1/chat")
//!     .json_body(json!({"messages": [{"role": "user", "content": "Hello"}]}))
//!     .bearer_token("sk-...")
//!     .heartbeat_timeout(Some(Duration::from_secs(20)))
//!     .max_reconnect_attempts(5);
//!
//! let (handle, mut events) = SseClient::spawn(config)?.split();
//! handle.connect().await;
//!
//! while let Some(event) = events.next_event().await {
//!     match event {
//!         SseClientEvent::Message(event) => print!("{}", event.raw),
//!         SseClientEvent::Closed => break,
//!         _ => {}
//!     }
//! }
//! println!("\n{}", handle.transcript());
//! # Ok(())
//! # }
//! ```
//!
//! # Parsing Without the Client
//!
//! Callers that already own an HTTP response, or want the raw frames without
//! reconnection and buffering, can wrap any `Stream<Item = Result<Bytes, E>>`
//! in an [`EventStream`]. It applies the same parser the client uses.
//!
//! ```rust,no_run
//! use chat_transport::sse::{EventStream, SseFrame};
//! use futures_util::StreamExt;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let response = reqwest::get("https://api.example.com/v1/stream").await?;
//! let mut frames = EventStream::new(response.bytes_stream());
//! while let Some(frame) = frames.next().await {
//!     if let SseFrame::Event(record) = frame? {
//!         println!("{}: {}", record.event_type, record.data);
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Module Index
//!
//! | Module | Description |
//! |--------|-------------|
//! | `config` | [`SseConfig`] builder for connection settings |
//! | [`connection`] | [`SseClient`], [`SseHandle`], [`SseEvents`] |
//! | [`parse`] | [`SseParser`], [`EventStream`] |
//! | [`transport`] | [`SseTransport`] seam, [`ReqwestSseTransport`] |
//! | `types` | [`StreamEvent`], [`SseStatus`], [`SseClientEvent`] |

mod config;
pub mod connection;
pub mod parse;
pub mod transport;
mod types;

// Re-export config types
pub use config::SseConfig;
// Re-export connection types
pub use connection::{SseClient, SseEvents, SseHandle};
// Re-export parser types
pub use parse::{EventStream, SseFrame, SseParser, SseRecord};
// Re-export transport types
pub use transport::{ByteStream, ReqwestSseTransport, SseRequest, SseTransport};
// Re-export core types
pub use types::{SseClientEvent, SseStatus, StreamEvent};
