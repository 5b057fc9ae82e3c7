//! WebSocket connection configuration.

use std::time::Duration;

use super::types::WsMessage;
use crate::reconnect::ReconnectConfig;

/// Application-level liveness check.
///
/// While the socket is open, `ping_message` is sent every `interval`. If no
/// frame of any kind arrives within `timeout` of a ping, the connection is
/// considered dead.
#[derive(Clone, Debug, PartialEq)]
pub struct HeartbeatConfig {
    /// Interval between ping messages.
    pub interval: Duration,
    /// Maximum time to wait for any inbound frame after a ping.
    pub timeout: Duration,
    /// Payload sent as the ping.
    pub ping_message: WsMessage,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(10),
            ping_message: WsMessage::Text(r#"{"type":"ping"}"#.to_string()),
        }
    }
}

/// Configuration for WebSocket connections.
#[derive(Clone, Debug)]
pub struct WsConfig {
    // URL
    /// WebSocket endpoint URL.
    pub url: String,
    /// Subprotocols offered in `Sec-WebSocket-Protocol`.
    pub protocols: Vec<String>,

    // Messages
    /// Try to decode text frames as JSON.
    pub parse_json: bool,
    /// Maximum inbound message size in bytes; larger frames are dropped.
    pub max_message_size: usize,

    // Heartbeat settings
    /// Application-level heartbeat (None = disabled).
    pub heartbeat: Option<HeartbeatConfig>,

    // Channels
    /// Capacity of the outbound message channel.
    pub outbound_channel_capacity: usize,

    // Connection
    /// Timeout for the opening handshake.
    pub connect_timeout: Duration,
    /// Reconnection policy.
    pub reconnect: ReconnectConfig,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            protocols: Vec::new(),
            parse_json: true,
            max_message_size: 16 * 1024 * 1024, // 16 MB
            heartbeat: Some(HeartbeatConfig::default()),
            outbound_channel_capacity: 64,
            connect_timeout: Duration::from_secs(10),
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl WsConfig {
    /// Create a new configuration with the given URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set the offered subprotocols.
    #[must_use]
    pub fn protocols<I, S>(mut self, protocols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.protocols = protocols.into_iter().map(Into::into).collect();
        self
    }

    /// Enable or disable JSON decoding of text frames.
    #[must_use]
    pub fn parse_json(mut self, parse_json: bool) -> Self {
        self.parse_json = parse_json;
        self
    }

    /// Set the maximum inbound message size.
    #[must_use]
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Set or disable the heartbeat.
    #[must_use]
    pub fn heartbeat(mut self, heartbeat: Option<HeartbeatConfig>) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    /// Set the heartbeat interval, enabling the heartbeat if needed.
    #[must_use]
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat.get_or_insert_with(HeartbeatConfig::default).interval = interval;
        self
    }

    /// Set the heartbeat timeout, enabling the heartbeat if needed.
    #[must_use]
    pub fn heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat.get_or_insert_with(HeartbeatConfig::default).timeout = timeout;
        self
    }

    /// Set the outbound channel capacity.
    #[must_use]
    pub fn outbound_channel_capacity(mut self, capacity: usize) -> Self {
        self.outbound_channel_capacity = capacity;
        self
    }

    /// Set the connection timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
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
        self.reconnect.validate()?;
        if let Some(heartbeat) = &self.heartbeat {
            if heartbeat.interval.is_zero() {
                return Err("Heartbeat interval must be > 0".to_string());
            }
            if heartbeat.timeout.is_zero() {
                return Err("Heartbeat timeout must be > 0".to_string());
            }
        }
        if self.connect_timeout.is_zero() {
            return Err("Connect timeout must be > 0".to_string());
        }
        if self.max_message_size == 0 {
            return Err("Max message size must be > 0".to_string());
        }
        if self.outbound_channel_capacity == 0 {
            return Err("Outbound channel capacity must be > 0".to_string());
        }
        Ok(())
    }
}
