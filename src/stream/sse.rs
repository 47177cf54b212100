//! `text/event-stream` framing.
//!
//! Splits a byte stream into server-sent event messages. Only the framing
//! lives here; the `data` of each message is handed to the
//! [`EventCodec`](super::EventCodec) untouched.

use futures_util::{stream, Stream, StreamExt};
use std::collections::VecDeque;

use super::transport::PayloadStream;
use crate::error::Error;

/// One dispatched server-sent event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseMessage {
    /// Event name, `message` unless the server sent an `event:` field
    pub event: String,
    /// `data:` lines joined with `\n`
    pub data: String,
    /// Last event id seen on the stream, if any
    pub id: Option<String>,
}

impl SseMessage {
    /// Whether an `EventSource.onmessage` handler would receive this event
    pub fn is_default_event(&self) -> bool {
        self.event == "message"
    }
}

/// Incremental `text/event-stream` parser
#[derive(Debug, Default)]
pub struct SseDecoder {
    line: Vec<u8>,
    data: String,
    has_data: bool,
    event: Option<String>,
    last_id: Option<String>,
    retry: Option<u64>,
    skip_lf: bool,
    started: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconnection time last advertised by the server (`retry:` field), in ms
    pub fn retry(&self) -> Option<u64> {
        self.retry
    }

    /// Feed a chunk of bytes; returns every message completed by it
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseMessage> {
        let mut out = Vec::new();
        for &byte in chunk {
            if self.skip_lf {
                self.skip_lf = false;
                if byte == b'\n' {
                    continue;
                }
            }
            match byte {
                b'\n' => self.end_line(&mut out),
                b'\r' => {
                    self.end_line(&mut out);
                    self.skip_lf = true;
                }
                _ => self.line.push(byte),
            }
        }
        out
    }

    fn end_line(&mut self, out: &mut Vec<SseMessage>) {
        let raw = std::mem::take(&mut self.line);
        let mut line = String::from_utf8_lossy(&raw).into_owned();
        if !self.started {
            self.started = true;
            if let Some(stripped) = line.strip_prefix('\u{feff}') {
                line = stripped.to_string();
            }
        }
        self.process_line(&line, out);
    }

    fn process_line(&mut self, line: &str, out: &mut Vec<SseMessage>) {
        if line.is_empty() {
            self.dispatch(out);
            return;
        }
        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.find(':') {
            Some(idx) => {
                let value = &line[idx + 1..];
                (&line[..idx], value.strip_prefix(' ').unwrap_or(value))
            }
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => {
                self.data.push_str(value);
                self.data.push('\n');
                self.has_data = true;
            }
            "id" => {
                if !value.contains('\0') {
                    self.last_id = Some(value.to_string());
                }
            }
            "retry" => {
                if let Ok(ms) = value.parse::<u64>() {
                    self.retry = Some(ms);
                }
            }
            _ => {}
        }
    }

    fn dispatch(&mut self, out: &mut Vec<SseMessage>) {
        let event = self.event.take();
        if !self.has_data {
            return;
        }
        self.has_data = false;

        let mut data = std::mem::take(&mut self.data);
        if data.ends_with('\n') {
            data.pop();
        }
        out.push(SseMessage {
            event: event
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| "message".to_string()),
            data,
            id: self.last_id.clone(),
        });
    }
}

/// Turn an HTTP body stream into a stream of default-event `data` payloads.
///
/// Ends when the body ends; a body error is yielded once and ends the stream.
pub(crate) fn payload_stream<S, B, E>(body: S) -> PayloadStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<Error> + Send + 'static,
{
    let state = (Box::pin(body), SseDecoder::new(), VecDeque::new(), false);
    let payloads = stream::unfold(state, |(mut body, mut decoder, mut ready, done)| async move {
        loop {
            if let Some(data) = ready.pop_front() {
                return Some((Ok(data), (body, decoder, ready, done)));
            }
            if done {
                return None;
            }
            match body.next().await {
                Some(Ok(chunk)) => {
                    ready.extend(
                        decoder
                            .feed(chunk.as_ref())
                            .into_iter()
                            .filter(SseMessage::is_default_event)
                            .map(|m| m.data),
                    );
                }
                Some(Err(e)) => return Some((Err(e.into()), (body, decoder, ready, true))),
                None => return None,
            }
        }
    });
    Box::pin(payloads)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data_of(messages: Vec<SseMessage>) -> Vec<String> {
        messages.into_iter().map(|m| m.data).collect()
    }

    #[test]
    fn test_single_message() {
        let mut decoder = SseDecoder::new();
        let messages = decoder.feed(b"data: {\"type\":\"connected\"}\n\n");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].event, "message");
        assert_eq!(messages[0].data, "{\"type\":\"connected\"}");
    }

    #[test]
    fn test_message_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"data: {\"type\":").is_empty());
        assert!(decoder.feed(b"\"connected\"}\r").is_empty());
        let messages = decoder.feed(b"\n\r\n");
        assert_eq!(data_of(messages), vec!["{\"type\":\"connected\"}"]);
    }

    #[test]
    fn test_multiline_data_and_comments() {
        let mut decoder = SseDecoder::new();
        let messages = decoder.feed(b": keep-alive\n\ndata: first\ndata:second\n\n");
        assert_eq!(data_of(messages), vec!["first\nsecond"]);
    }

    #[test]
    fn test_named_events_and_ids() {
        let mut decoder = SseDecoder::new();
        let messages = decoder.feed(b"\xEF\xBB\xBFid: 7\nevent: heartbeat\ndata: x\n\nretry: 3000\ndata: y\n\n");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].event, "heartbeat");
        assert!(!messages[0].is_default_event());
        assert_eq!(messages[1].event, "message");
        assert_eq!(messages[1].id.as_deref(), Some("7"));
        assert_eq!(decoder.retry(), Some(3000));
    }

    #[test]
    fn test_blank_lines_without_data_dispatch_nothing() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"\n\n\nevent: noop\n\n").is_empty());
    }

    #[tokio::test]
    async fn test_payload_stream_filters_named_events() {
        let chunks: Vec<std::result::Result<Vec<u8>, Error>> = vec![
            Ok(b"data: one\n\nevent: ping\ndata: skip\n\n".to_vec()),
            Ok(b"data: two\n".to_vec()),
            Ok(b"\n".to_vec()),
        ];
        let payloads: Vec<String> = payload_stream(stream::iter(chunks))
            .map(|item| item.unwrap())
            .collect()
            .await;
        assert_eq!(payloads, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_payload_stream_stops_after_error() {
        let chunks: Vec<std::result::Result<Vec<u8>, Error>> = vec![
            Ok(b"data: one\n\n".to_vec()),
            Err(Error::Transport("reset by peer".into())),
            Ok(b"data: never\n\n".to_vec()),
        ];
        let items: Vec<_> = payload_stream(stream::iter(chunks)).collect().await;
        assert_eq!(items.len(), 2);
        assert!(matches!(items[1], Err(Error::Transport(_))));
    }
}
