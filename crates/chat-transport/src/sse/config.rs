//! SSE connection configuration.

use std::time::Duration;

use crate::reconnect::ReconnectConfig;

/// Configuration for SSE connections.
///
/// Follows the same builder pattern as the WebSocket module's `WsConfig`,
/// providing sensible defaults and chainable setter methods. A running client never sees configuration
/// changes; build a new client instead.
#[derive(Clone, Debug)]
pub struct SseConfig {
    /// SSE endpoint URL.
    pub url: String,
    /// HTTP method (GET or POST).
    pub method: http::Method,
    /// Additional HTTP headers to include with every SSE request.
    pub headers: http::HeaderMap,
    /// JSON request body (POST only).
    pub json_body: Option<serde_json::Value>,
    /// Sent as `Authorization: Bearer <token>` when set.
    pub bearer_token: Option<String>,
    /// Send `Last-Event-ID` on reconnect when an id has been seen.
    pub resume_from_last_event_id: bool,
    /// Keep cookies set by the server across requests.
    pub with_credentials: bool,
    /// Timeout for receiving the response head.
    pub connect_timeout: Duration,
    /// Silence window after which the stream counts as stale (None = never).
    pub heartbeat_timeout: Option<Duration>,
    /// Try to decode `data` as JSON.
    pub parse_json: bool,
    /// Reconnection policy.
    pub reconnect: ReconnectConfig,
}

impl Default for SseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            method: http::Method::GET,
            headers: http::HeaderMap::new(),
            json_body: None,
            bearer_token: None,
            resume_from_last_event_id: true,
            with_credentials: false,
            connect_timeout: Duration::from_secs(10),
            heartbeat_timeout: Some(Duration::from_secs(30)),
            parse_json: true,
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl SseConfig {
    /// Create a new SSE configuration with the given URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set the HTTP method.
    #[must_use]
    pub fn method(mut self, method: http::Method) -> Self {
        self.method = method;
        self
    }

    /// Set additional HTTP headers.
    #[must_use]
    pub fn headers(mut self, headers: http::HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// POST the given JSON body. Also switches the method to POST.
    #[must_use]
    pub fn json_body(mut self, body: serde_json::Value) -> Self {
        self.method = http::Method::POST;
        self.json_body = Some(body);
        self
    }

    /// Set the bearer token.
    #[must_use]
    pub fn bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Enable or disable `Last-Event-ID` resumption.
    #[must_use]
    pub fn resume_from_last_event_id(mut self, resume: bool) -> Self {
        self.resume_from_last_event_id = resume;
        self
    }

    /// Enable or disable the cookie store.
    #[must_use]
    pub fn with_credentials(mut self, with_credentials: bool) -> Self {
        self.with_credentials = with_credentials;
        self
    }

    /// Set the connection timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the staleness window.
    #[must_use]
    pub fn heartbeat_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.heartbeat_timeout = timeout;
        self
    }

    /// Enable or disable JSON decoding of event data.
    #[must_use]
    pub fn parse_json(mut self, parse_json: bool) -> Self {
        self.parse_json = parse_json;
        self
    }

    /// Enable or disable automatic reconnection.
    #[must_use]
    pub fn auto_reconnect(mut self, enabled: bool) -> Self {
        self.reconnect.enabled = enabled;
        self
    }

    /// Set the reconnect base delay.
    #[must_use]
    pub fn reconnect_base_delay(mut self, delay: Duration) -> Self {
        self.reconnect.base_delay = delay;
        self
    }

    /// Set the maximum reconnection delay.
    #[must_use]
    pub fn reconnect_max_delay(mut self, delay: Duration) -> Self {
        self.reconnect.max_delay = delay;
        self
    }

    /// Set the maximum reconnection attempts.
    #[must_use]
    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.reconnect.max_attempts = attempts;
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error message string if any field has an invalid value.
    pub fn validate(&self) -> Result<(), String> {
        if self.url.is_empty() {
            return Err("URL cannot be empty".to_string());
        }
        if self.method != http::Method::GET && self.method != http::Method::POST {
            return Err("Method must be GET or POST".to_string());
        }
        if self.method == http::Method::GET && self.json_body.is_some() {
            return Err("A JSON body requires POST".to_string());
        }
        if self.connect_timeout.is_zero() {
            return Err("Connect timeout must be > 0".to_string());
        }
        if self.heartbeat_timeout.is_some_and(|timeout| timeout.is_zero()) {
            return Err("Heartbeat timeout must be > 0".to_string());
        }
        self.reconnect.validate()
    }
}
