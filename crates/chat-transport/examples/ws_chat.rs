//! WebSocket Chat Example
//!
//! Opens a chat socket, sends one prompt once connected, and prints every
//! message until the server closes the session.
//!
//! Run with:
//! `WS_URL=ws://localhost:8080/ws cargo run -p chat-transport --example ws_chat`

use std::time::Duration;

use chat_transport::websocket::{CLOSE_NORMAL, WsClient, WsClientEvent, WsConfig};
use serde_json::json;
use tokio::signal;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let url = std::env::var("WS_URL").unwrap_or_else(|_| "ws://localhost:8080/ws".into());
    let config = WsConfig::new(url)
        .protocols(["chat.v1"])
        .heartbeat_interval(Duration::from_secs(15))
        .heartbeat_timeout(Duration::from_secs(5))
        .max_reconnect_attempts(5);

    let (handle, mut events) = WsClient::spawn(config)?.split();
    handle.connect().await;

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                handle.disconnect(CLOSE_NORMAL, "client exit").await;
                break;
            }
            event = events.next_event() => {
                let Some(event) = event else { break };
                match event {
                    WsClientEvent::Open => {
                        println!("[open]");
                        handle.send_json(&json!({"type": "prompt", "text": "Hello there"}));
                    }
                    WsClientEvent::Message(message) => println!("[{:?}] {:?}", message.kind, message.data),
                    WsClientEvent::Error(err) => eprintln!("[error] {err}"),
                    WsClientEvent::HeartbeatFailed => eprintln!("[heartbeat] no reply"),
                    WsClientEvent::Reconnecting { attempt, delay } => {
                        println!("[reconnect] attempt {attempt} in {delay:?}");
                    }
                    WsClientEvent::Closed { code, reason, was_clean } => {
                        println!("[closed] code={code:?} reason={reason:?} clean={was_clean}");
                        if was_clean {
                            break;
                        }
                    }
                    WsClientEvent::MaxReconnectAttemptsReached => {
                        eprintln!("[error] giving up");
                        break;
                    }
                    WsClientEvent::StatusChanged(status) => println!("[status] {status}"),
                }
            }
        }
    }

    println!("Received {} messages", handle.messages().len());
    Ok(())
}
