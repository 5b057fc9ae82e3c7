//! Incremental `text/event-stream` parser.

use std::time::Duration;

use bytes::{Buf, BytesMut};

/// Newline byte
const LF: u8 = b'\n';
/// Carriage return byte
const CR: u8 = b'\r';
/// UTF-8 byte order mark
const BOM: &[u8; 3] = b"\xEF\xBB\xBF";
/// Event type used when a record carries no `event:` field.
pub(crate) const DEFAULT_EVENT_TYPE: &str = "message";

/// A complete record, terminated by a blank line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SseRecord {
    /// The `event:` field, or `"message"`.
    pub event_type: String,
    /// All `data:` lines of the record joined with `\n`.
    pub data: String,
    /// The `id:` field seen inside this record, if any.
    pub id: Option<String>,
    /// The `retry:` hint seen inside this record, if any.
    pub retry: Option<Duration>,
}

/// Output of [`SseParser::feed`], in wire order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SseFrame {
    /// A full record with non-empty data.
    Event(SseRecord),
    /// An `id:` line. Reported as soon as it is read, before its record ends.
    LastEventId(String),
    /// A valid `retry:` line, in milliseconds.
    Retry(Duration),
}

/// Valid field names; anything else is ignored.
#[derive(Debug, Clone, Copy)]
enum FieldName {
    Event,
    Data,
    Id,
    Retry,
    Ignored,
}

impl FieldName {
    fn from_bytes(name: &[u8]) -> Self {
        match name {
            b"event" => Self::Event,
            b"data" => Self::Data,
            b"id" => Self::Id,
            b"retry" => Self::Retry,
            _ => Self::Ignored,
        }
    }
}

/// Accumulators for the record being assembled.
#[derive(Debug, Default)]
struct PendingRecord {
    event_type: Option<String>,
    data: Option<String>,
    id: Option<String>,
    retry: Option<Duration>,
}

impl PendingRecord {
    fn push_data(&mut self, value: &str) {
        match self.data.as_mut() {
            Some(data) => {
                data.push('\n');
                data.push_str(value);
            }
            None => self.data = Some(value.to_owned()),
        }
    }

    /// Close the record. Returns an event only if data is non-empty.
    fn dispatch(&mut self) -> Option<SseRecord> {
        let PendingRecord {
            event_type,
            data,
            id,
            retry,
        } = std::mem::take(self);

        let data = data.filter(|data| !data.is_empty())?;
        Some(SseRecord {
            event_type: event_type
                .filter(|event_type| !event_type.is_empty())
                .unwrap_or_else(|| DEFAULT_EVENT_TYPE.to_owned()),
            data,
            id,
            retry,
        })
    }
}

/// Push-based SSE parser.
///
/// Bytes are buffered until a `\n` completes a line, so the frames produced
/// do not depend on how the input was split into chunks.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: BytesMut,
    pending: PendingRecord,
    started: bool,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every frame it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        let mut frames = Vec::new();
        if chunk.is_empty() {
            return frames;
        }
        self.buffer.extend_from_slice(chunk);

        if !self.started {
            match starts_with_bom(&self.buffer) {
                Some(true) => {
                    self.buffer.advance(BOM.len());
                    self.started = true;
                }
                Some(false) => self.started = true,
                None => return frames,
            }
        }

        while let Some(line_end) = memchr::memchr(LF, &self.buffer) {
            let mut line = self.buffer.split_to(line_end + 1);
            line.truncate(line_end);
            if line.last() == Some(&CR) {
                line.truncate(line_end - 1);
            }
            self.process_line(&line, &mut frames);
        }
        frames
    }

    /// Drop any unterminated line and partial record.
    pub fn finish(&mut self) {
        self.buffer.clear();
        self.pending = PendingRecord::default();
    }

    /// Bytes waiting for a line terminator.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    fn process_line(&mut self, line: &[u8], frames: &mut Vec<SseFrame>) {
        if line.is_empty() {
            if let Some(record) = self.pending.dispatch() {
                frames.push(SseFrame::Event(record));
            }
            return;
        }

        let Some(colon) = memchr::memchr(b':', line) else {
            return;
        };
        let value = &line[colon + 1..];
        // Strip single leading space if present.
        let value = match value {
            [b' ', rest @ ..] => rest,
            _ => value,
        };
        let value = String::from_utf8_lossy(value);

        match FieldName::from_bytes(&line[..colon]) {
            FieldName::Event => self.pending.event_type = Some(value.into_owned()),
            FieldName::Data => self.pending.push_data(&value),
            FieldName::Id => {
                if memchr::memchr(0, value.as_bytes()).is_none() {
                    let id = value.into_owned();
                    self.pending.id = Some(id.clone());
                    frames.push(SseFrame::LastEventId(id));
                }
            }
            FieldName::Retry => {
                if let Ok(millis) = value.trim().parse::<u64>() {
                    let retry = Duration::from_millis(millis);
                    self.pending.retry = Some(retry);
                    frames.push(SseFrame::Retry(retry));
                }
            }
            FieldName::Ignored => {}
        }
    }
}

/// `None` while the buffer is still a strict prefix of the BOM.
fn starts_with_bom(buf: &[u8]) -> Option<bool> {
    if buf.len() < BOM.len() && BOM.starts_with(buf) {
        return None;
    }
    Some(buf.starts_with(BOM))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(event_type: &str, data: &str, id: Option<&str>) -> SseFrame {
        SseFrame::Event(SseRecord {
            event_type: event_type.to_string(),
            data: data.to_string(),
            id: id.map(str::to_string),
            retry: None,
        })
    }

    fn parse_all(input: &[u8]) -> Vec<SseFrame> {
        let mut parser = SseParser::new();
        parser.feed(input)
    }

    fn parse_split(input: &[u8], chunk_len: usize) -> Vec<SseFrame> {
        let mut parser = SseParser::new();
        input
            .chunks(chunk_len)
            .flat_map(|chunk| parser.feed(chunk))
            .collect()
    }

    #[test]
    fn single_data_line() {
        assert_eq!(parse_all(b"data: hello\n\n"), vec![record("message", "hello", None)]);
    }

    #[test]
    fn multiple_data_lines_are_newline_joined() {
        assert_eq!(
            parse_all(b"data: YHOO\ndata: +2\ndata: 10\n\n"),
            vec![record("message", "YHOO\n+2\n10", None)]
        );
    }

    #[test]
    fn event_type_and_id() {
        assert_eq!(
            parse_all(b"event: delta\nid: 7\ndata: {\"t\":\"Hi\"}\n\n"),
            vec![
                SseFrame::LastEventId("7".to_string()),
                record("delta", "{\"t\":\"Hi\"}", Some("7")),
            ]
        );
    }

    #[test]
    fn accumulators_reset_between_records() {
        assert_eq!(
            parse_all(b"event: add\nid: 1\ndata: a\n\ndata: b\n\n"),
            vec![
                SseFrame::LastEventId("1".to_string()),
                record("add", "a", Some("1")),
                record("message", "b", None),
            ]
        );
    }

    #[test]
    fn retry_is_reported_and_attached() {
        let frames = parse_all(b"retry: 5000\ndata: x\n\nretry: soon\n\n");
        assert_eq!(
            frames,
            vec![
                SseFrame::Retry(Duration::from_millis(5000)),
                SseFrame::Event(SseRecord {
                    event_type: "message".to_string(),
                    data: "x".to_string(),
                    id: None,
                    retry: Some(Duration::from_millis(5000)),
                }),
            ]
        );
    }

    #[test]
    fn records_without_data_are_not_emitted() {
        assert_eq!(parse_all(b"event: ping\n\ndata:\n\n\n\n"), vec![]);
    }

    #[test]
    fn colonless_lines_comments_and_unknown_fields_are_ignored() {
        assert_eq!(
            parse_all(b": keep-alive\nhello world\nfoo: bar\ndata: kept\n\n"),
            vec![record("message", "kept", None)]
        );
    }

    #[test]
    fn only_one_leading_space_is_stripped() {
        assert_eq!(
            parse_all(b"data:  padded\ndata:tight\n\n"),
            vec![record("message", " padded\ntight", None)]
        );
    }

    #[test]
    fn value_may_contain_colons() {
        assert_eq!(
            parse_all(b"data: {\"a\":\"b:c\"}\n\n"),
            vec![record("message", "{\"a\":\"b:c\"}", None)]
        );
    }

    #[test]
    fn crlf_line_endings() {
        assert_eq!(
            parse_all(b"data: one\r\ndata: two\r\n\r\n"),
            vec![record("message", "one\ntwo", None)]
        );
    }

    #[test]
    fn unterminated_record_is_held_back() {
        let mut parser = SseParser::new();
        assert_eq!(parser.feed(b"data: partial\n"), vec![]);
        assert_eq!(parser.feed(b"data: still"), vec![]);
        assert_eq!(parser.buffered_len(), "data: still".len());
        parser.finish();
        assert_eq!(parser.buffered_len(), 0);
        assert_eq!(parser.feed(b"\n\n"), vec![]);
    }

    #[test]
    fn leading_bom_is_skipped_even_when_split() {
        let mut parser = SseParser::new();
        assert_eq!(parser.feed(b"\xEF\xBB"), vec![]);
        assert_eq!(
            parser.feed(b"\xBFdata: a\n\n"),
            vec![record("message", "a", None)]
        );
    }

    #[test]
    fn ids_with_nul_are_ignored() {
        assert_eq!(
            parse_all(b"id: a\0b\ndata: x\n\n"),
            vec![record("message", "x", None)]
        );
    }

    #[test]
    fn chunk_boundaries_do_not_change_output() {
        let input = "retry: 2500\nevent: delta\nid: 41\ndata: {\"text\":\"héllo\"}\ndata: wörld\n\n\
                     : comment\ndata: second\r\n\r\nid: 42\n\nevent: done\ndata: [DONE]\n\ndata: tail"
            .as_bytes();
        let whole = parse_all(input);
        assert_eq!(whole.len(), 6);
        for chunk_len in 1..input.len() {
            assert_eq!(parse_split(input, chunk_len), whole, "chunk_len={chunk_len}");
        }
    }
}
