//! Incremental `text/event-stream` parsing.
//!
//! [`SseParser`] is push-based: the connection driver feeds it each body
//! chunk as it arrives. [`EventStream`] wraps the same parser around any
//! byte stream for callers that only need parsed frames.

pub mod event_stream;
pub mod parser;

pub use event_stream::EventStream;
pub use parser::{SseFrame, SseParser, SseRecord};
