//! WebSocket transport for full-duplex chat sessions.
//!
//! This module provides a WebSocket client with support for:
//!
//! - **Send/Receive**: Text and binary frames, with best-effort JSON decoding
//!   of inbound text and a JSON convenience for outbound messages.
//! - **Heartbeat**: An application-level ping on a fixed interval. Any inbound
//!   frame counts as liveness; silence after a ping triggers recovery.
//! - **Auto-Reconnection**: Exponential backoff with a ceiling and bounded
//!   attempts. Only abnormal closures reconnect.
//!
//! # Architecture
//!
//! The client uses an actor-based architecture:
//!
//! ```text
//! ┌─────────────┐  commands   ┌─────────────────┐     ┌──────────────┐
//! │  WsHandle   │────────────▶│    WsDriver     │◀───▶│    Chat      │
//! │  (Clone)    │  outbound   │  (Background)   │     │    Server    │
//! └─────────────┘────────────▶└───────┬─────────┘     └──────────────┘
//!                                     │ unbounded
//!                                     ▼
//!                             ┌────────────────┐
//!                             │    WsEvents    │
//!                             └────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use chat_transport::websocket::{WsClient, WsClientEvent, WsConfig};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = WsConfig::new("wss://chat.example.com/ws")
//!     .protocols(["chat.v1"])
//!     .heartbeat_interval(std::time::Duration::from_secs(20));
//!
//! let (handle, mut events) = WsClient::spawn(config)?.split();
//! handle.connect().await;
//!
//! while let Some(event) = events.next_event().await {
//!     match event {
//!         WsClientEvent::Open => {
//!             handle.send_json(&json!({"type": "prompt", "text": "Hello"}));
//!         }
//!         WsClientEvent::Message(message) => println!("{:?}", message.data),
//!         WsClientEvent::Closed { was_clean: true, .. } => break,
//!         _ => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod config;
pub mod connection;
pub mod transport;
mod types;

pub use config::{HeartbeatConfig, WsConfig};
pub use connection::{CLOSE_ABNORMAL, CLOSE_NORMAL, WsClient, WsEvents, WsHandle};
pub use transport::{TungsteniteConnector, WsConnector, WsSink, WsSource};
pub use types::{MessageKind, SocketMessage, WsClientEvent, WsMessage, WsStatus};
