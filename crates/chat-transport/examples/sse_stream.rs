//! SSE Stream Example
//!
//! Streams a chat completion over Server-Sent Events and prints each chunk as
//! it arrives.
//!
//! Run with:
//! `SSE_URL=http://localhost:8080/v1/chat cargo run -p chat-transport --example sse_stream`
//!
//! Set `RUST_LOG=chat_transport=debug` to watch the connection lifecycle.

use std::time::Duration;

use chat_transport::sse::{SseClient, SseClientEvent, SseConfig};
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let url = std::env::var("SSE_URL").unwrap_or_else(|_| "http://localhost:8080/v1/chat".into());
    let mut config = SseConfig::new(url)
        .method(http::Method::POST)
        .json_body(json!({
            "model": "demo",
            "stream": true,
            "messages": [{"role": "user", "content": "Tell me a short story."}],
        }))
        .connect_timeout(Duration::from_secs(10))
        .heartbeat_timeout(Some(Duration::from_secs(60)))
        .max_reconnect_attempts(3);
    if let Ok(token) = std::env::var("SSE_TOKEN") {
        config = config.bearer_token(token);
    }

    let (handle, mut events) = SseClient::spawn(config)?.split();
    handle.connect().await;

    while let Some(event) = events.next_event().await {
        match event {
            SseClientEvent::StatusChanged(status) => println!("[status] {status}"),
            SseClientEvent::Message(event) => {
                println!("[{}] {}", event.event_type, event.raw);
                if event.raw == "[DONE]" {
                    handle.disconnect().await;
                }
            }
            SseClientEvent::Error(err) => eprintln!("[error] {err}"),
            SseClientEvent::Reconnecting { attempt, delay } => {
                println!("[reconnect] attempt {attempt} in {delay:?}");
            }
            SseClientEvent::MaxReconnectAttemptsReached => {
                eprintln!("[error] giving up");
                break;
            }
            SseClientEvent::Closed => break,
            SseClientEvent::Open => println!("[open]"),
        }
    }

    println!();
    println!("Transcript ({} events):", handle.events().len());
    println!("{}", handle.transcript());
    Ok(())
}
