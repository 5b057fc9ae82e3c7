//! [`Stream`] that converts a stream of [`Bytes`] chunks into [`SseFrame`]s.

use std::{
    collections::VecDeque,
    pin::Pin,
    task::{Context, Poll, ready},
};

use bytes::Bytes;
use futures_util::Stream;

use super::parser::{SseFrame, SseParser};

pin_project_lite::pin_project! {
    /// A [`Stream`] that parses a byte stream into [`SseFrame`]s.
    ///
    /// Transport errors from the inner stream are passed through unchanged.
    /// When the inner stream ends, an unterminated trailing record is
    /// discarded.
    #[derive(Debug)]
    pub struct EventStream<S> {
        #[pin]
        stream: S,
        parser: SseParser,
        ready: VecDeque<SseFrame>,
        terminated: bool,
    }
}

impl<S> EventStream<S> {
    /// Create a new [`EventStream`] from an underlying byte stream.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            parser: SseParser::new(),
            ready: VecDeque::new(),
            terminated: false,
        }
    }
}

impl<S, E> Stream for EventStream<S>
where
    S: Stream<Item = Result<Bytes, E>>,
{
    type Item = Result<SseFrame, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            if let Some(frame) = this.ready.pop_front() {
                return Poll::Ready(Some(Ok(frame)));
            }
            if *this.terminated {
                return Poll::Ready(None);
            }

            match ready!(this.stream.as_mut().poll_next(cx)) {
                Some(Ok(chunk)) => this.ready.extend(this.parser.feed(&chunk)),
                Some(Err(e)) => return Poll::Ready(Some(Err(e))),
                None => {
                    *this.terminated = true;
                    this.parser.finish();
                }
            }
        }
    }
}
