//! Socket side of the WebSocket client.
//!
//! [`WsConnector`] performs the opening handshake and hands the connection
//! driver a split sink/stream pair. [`TungsteniteConnector`] is the
//! production implementation.

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::{Sink, SinkExt, StreamExt, stream::BoxStream};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        Message,
        client::IntoClientRequest,
        http::{HeaderValue, header::SEC_WEBSOCKET_PROTOCOL},
    },
};
use tracing::debug;

use super::types::WsMessage;
use crate::error::{TransportError, TransportResult};

/// Write half of an open socket.
pub type WsSink = Pin<Box<dyn Sink<Message, Error = TransportError> + Send>>;

/// Read half of an open socket.
pub type WsSource = BoxStream<'static, TransportResult<Message>>;

/// Opens sockets for the WebSocket client.
#[async_trait]
pub trait WsConnector: Send + Sync + 'static {
    /// Perform the opening handshake, offering `protocols` when non-empty.
    async fn connect(&self, url: &str, protocols: &[String]) -> TransportResult<(WsSink, WsSource)>;
}

/// [`WsConnector`] backed by `tokio-tungstenite`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TungsteniteConnector;

#[async_trait]
impl WsConnector for TungsteniteConnector {
    async fn connect(&self, url: &str, protocols: &[String]) -> TransportResult<(WsSink, WsSource)> {
        let mut request = url.into_client_request()?;
        if !protocols.is_empty() {
            let value = HeaderValue::from_str(&protocols.join(", ")).map_err(|e| {
                TransportError::config(format!("Invalid WebSocket subprotocol list: {e}"))
            })?;
            request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, value);
        }

        let (socket, response) = connect_async(request).await?;
        debug!(
            url,
            status = %response.status(),
            protocol = ?response.headers().get(SEC_WEBSOCKET_PROTOCOL),
            "WebSocket handshake complete"
        );

        let (sink, stream) = socket.split();
        Ok((
            Box::pin(sink.sink_map_err(TransportError::from)),
            stream.map(|frame| frame.map_err(TransportError::from)).boxed(),
        ))
    }
}

impl From<WsMessage> for Message {
    fn from(message: WsMessage) -> Self {
        match message {
            WsMessage::Text(text) => Message::Text(text),
            WsMessage::Binary(bytes) => Message::Binary(bytes.to_vec()),
        }
    }
}
