//! Best-effort decoding of event and message payloads.

use bytes::Bytes;
use serde_json::Value;

/// Decoded payload of an SSE event or a WebSocket frame.
///
/// Text is parsed as JSON when decoding is enabled; anything that fails to
/// parse is kept verbatim as [`Payload::Text`].
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    /// Text that parsed as JSON.
    Json(Value),
    /// Text kept as-is (JSON decoding disabled or failed).
    Text(String),
    /// Binary frame contents.
    Binary(Bytes),
}

impl Payload {
    /// Decode `raw` as JSON if `parse_json` is set, falling back to raw text.
    pub fn from_text(raw: &str, parse_json: bool) -> Self {
        if parse_json && let Ok(value) = serde_json::from_str::<Value>(raw) {
            return Self::Json(value);
        }
        Self::Text(raw.to_owned())
    }

    /// Wrap binary data unchanged.
    pub fn from_binary(data: impl Into<Bytes>) -> Self {
        Self::Binary(data.into())
    }

    /// The decoded JSON value, if any.
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    /// The raw text, if this payload was kept as text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Returns `true` if the payload decoded as JSON.
    pub fn is_json(&self) -> bool {
        matches!(self, Self::Json(_))
    }
}
