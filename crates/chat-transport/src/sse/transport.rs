//! HTTP side of the SSE client.
//!
//! [`SseTransport`] is the seam between the connection driver and the HTTP
//! stack. [`ReqwestSseTransport`] is the production implementation.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{StreamExt, stream::BoxStream};
use http::{HeaderMap, HeaderValue, Method, header};
use tokio::time::timeout;
use tracing::{debug, warn};

use super::config::SseConfig;
use crate::error::{TransportError, TransportResult};

/// Response body as a stream of raw chunks.
pub type ByteStream = BoxStream<'static, TransportResult<Bytes>>;

/// A fully prepared SSE request.
#[derive(Clone, Debug)]
pub struct SseRequest {
    /// SSE endpoint URL.
    pub url: String,
    /// `GET` or `POST`.
    pub method: Method,
    /// Configured headers plus `Accept`, `Cache-Control`, `Authorization`
    /// and `Last-Event-ID` where they apply.
    pub headers: HeaderMap,
    /// JSON body sent with `POST`.
    pub json_body: Option<serde_json::Value>,
    /// Deadline for the response headers to arrive.
    pub connect_timeout: Duration,
}

impl SseRequest {
    /// Build the request for one connection attempt.
    ///
    /// `last_event_id` is only sent when resumption is enabled.
    pub fn from_config(config: &SseConfig, last_event_id: Option<&str>) -> Self {
        let mut headers = config.headers.clone();
        headers.insert(header::ACCEPT, HeaderValue::from_static("text/event-stream"));
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));

        if let Some(token) = config.bearer_token.as_deref() {
            match HeaderValue::from_str(&format!("Bearer {token}")) {
                Ok(mut value) => {
                    value.set_sensitive(true);
                    headers.insert(header::AUTHORIZATION, value);
                }
                Err(_) => warn!("Bearer token is not a valid header value, skipping"),
            }
        }

        // Last-Event-ID for resumption.
        if config.resume_from_last_event_id
            && let Some(id) = last_event_id
            && let Ok(value) = HeaderValue::from_str(id)
        {
            headers.insert(header::HeaderName::from_static("last-event-id"), value);
        }

        Self {
            url: config.url.clone(),
            method: config.method.clone(),
            headers,
            json_body: config.json_body.clone(),
            connect_timeout: config.connect_timeout,
        }
    }
}

/// Opens the HTTP stream for an SSE connection attempt.
#[async_trait]
pub trait SseTransport: Send + Sync + 'static {
    /// Send `request` and return the response body once the status is known
    /// to be successful.
    async fn open(&self, request: SseRequest) -> TransportResult<ByteStream>;
}

/// [`SseTransport`] backed by a shared `reqwest::Client`.
#[derive(Clone, Debug)]
pub struct ReqwestSseTransport {
    client: reqwest::Client,
}

impl ReqwestSseTransport {
    /// Build a client honouring the connect timeout and credentials toggle.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &SseConfig) -> TransportResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .cookie_store(config.with_credentials)
            .build()
            .map_err(|e| TransportError::config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Use an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SseTransport for ReqwestSseTransport {
    async fn open(&self, request: SseRequest) -> TransportResult<ByteStream> {
        let mut req = self
            .client
            .request(request.method, &request.url)
            .headers(request.headers);
        if let Some(body) = &request.json_body {
            req = req.json(body);
        }

        let resp = timeout(request.connect_timeout, req.send())
            .await
            .map_err(|_| TransportError::timeout(request.connect_timeout))??;

        // Validate status.
        let status = resp.status();
        if !status.is_success() {
            return Err(TransportError::sse_invalid_status(status));
        }
        debug!(url = %request.url, %status, "SSE response accepted");

        Ok(resp
            .bytes_stream()
            .map(|chunk| chunk.map_err(TransportError::from))
            .boxed())
    }
}
