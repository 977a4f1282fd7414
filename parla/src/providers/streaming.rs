//! Server-sent event parsing for streaming completions.

use crate::error::LlmError;
use bytes::{Bytes, BytesMut};
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Streaming response parser for SSE (Server-Sent Events) bodies.
///
/// Buffers raw body bytes, splits them into lines and yields the payload of
/// every `data:` line until the `[DONE]` marker. Lines are decoded as UTF-8
/// only once complete, so a character split across chunks is reassembled.
#[derive(Debug)]
pub struct SseStreamParser<S> {
    inner: S,
    buffer: BytesMut,
    done: bool,
}

impl<S> SseStreamParser<S>
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Unpin,
{
    /// Create a new SSE stream parser.
    pub fn new(stream: S) -> Self {
        Self {
            inner: stream,
            buffer: BytesMut::new(),
            done: false,
        }
    }

    /// Try to extract the next complete line from the buffer.
    fn next_line(&mut self) -> Option<Result<String, LlmError>> {
        let pos = self.buffer.iter().position(|&b| b == b'\n')?;
        let line = self.buffer.split_to(pos + 1);
        Some(decode_line(&line[..pos]))
    }

    /// Handle one line; `Some` carries a payload or signals the end marker.
    fn accept(&mut self, line: &str) -> Option<String> {
        let data = parse_sse_data(line)?;
        if is_done_marker(data) {
            self.done = true;
            return None;
        }
        Some(data.to_string())
    }
}

fn decode_line(line: &[u8]) -> Result<String, LlmError> {
    std::str::from_utf8(line)
        .map(str::to_owned)
        .map_err(|e| LlmError::stream(format!("invalid UTF-8 in event stream: {e}")))
}

/// Parse an SSE data line, stripping the `data:` prefix.
#[must_use]
pub fn parse_sse_data(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with(':') {
        return None;
    }
    trimmed
        .strip_prefix("data:")
        .map(str::trim_start)
}

/// Check if the data indicates stream completion.
#[must_use]
pub fn is_done_marker(data: &str) -> bool {
    data.trim() == "[DONE]"
}

impl<S> Stream for SseStreamParser<S>
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Unpin,
{
    type Item = Result<String, LlmError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if self.done {
                return Poll::Ready(None);
            }

            match self.next_line() {
                Some(Ok(line)) => {
                    if let Some(data) = self.accept(&line) {
                        return Poll::Ready(Some(Ok(data)));
                    }
                    continue;
                }
                Some(Err(e)) => {
                    self.done = true;
                    return Poll::Ready(Some(Err(e)));
                }
                None => {}
            }

            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => self.buffer.extend_from_slice(&bytes),
                Poll::Ready(Some(Err(e))) => {
                    self.done = true;
                    return Poll::Ready(Some(Err(LlmError::from(e))));
                }
                Poll::Ready(None) => {
                    // Flush a trailing line without newline.
                    let remaining = self.buffer.split();
                    self.done = true;
                    return match decode_line(&remaining) {
                        Ok(line) => Poll::Ready(self.accept(&line).map(Ok)),
                        Err(e) => Poll::Ready(Some(Err(e))),
                    };
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn body(chunks: &[&'static str]) -> impl Stream<Item = Result<Bytes, reqwest::Error>> + Unpin {
        let chunks: Vec<&'static [u8]> = chunks.iter().map(|&c| c.as_bytes()).collect();
        raw_body(&chunks)
    }

    fn raw_body(
        chunks: &[&'static [u8]],
    ) -> impl Stream<Item = Result<Bytes, reqwest::Error>> + Unpin + use<> {
        futures::stream::iter(
            chunks
                .iter()
                .map(|c| Ok(Bytes::from_static(c)))
                .collect::<Vec<_>>(),
        )
    }

    #[test]
    fn test_sse_parse_data() {
        assert_eq!(parse_sse_data("data: hello"), Some("hello"));
        assert_eq!(parse_sse_data("data:hello"), Some("hello"));
        assert_eq!(parse_sse_data("data: [DONE]"), Some("[DONE]"));
        assert_eq!(parse_sse_data(""), None);
        assert_eq!(parse_sse_data(": keep-alive"), None);
        assert_eq!(parse_sse_data("event: message"), None);
    }

    #[test]
    fn test_sse_is_done_marker() {
        assert!(is_done_marker("[DONE]"));
        assert!(is_done_marker("  [DONE]  "));
        assert!(!is_done_marker("done"));
        assert!(!is_done_marker("{}"));
    }

    #[tokio::test]
    async fn test_lines_split_across_chunks() {
        let parser = SseStreamParser::new(body(&["data: {\"a\"", ":1}\n\ndata: two\n", "data: [DONE]\n"]));
        let items: Vec<String> = parser.map(|r| r.expect("payload")).collect().await;
        assert_eq!(items, vec!["{\"a\":1}", "two"]);
    }

    #[tokio::test]
    async fn test_character_split_across_chunks() {
        let parser = SseStreamParser::new(raw_body(&[
            b"data: caf\xC3",
            b"\xA9\ndata: \xF0\x9F",
            b"\x8D\x95 pizza\n",
        ]));
        let items: Vec<String> = parser.map(|r| r.expect("payload")).collect().await;
        assert_eq!(items, vec!["caf\u{e9}", "\u{1F355} pizza"]);
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_is_an_error() {
        let parser = SseStreamParser::new(raw_body(&[b"data: ok\n", b"data: \xFF\n", b"data: late\n"]));
        let items: Vec<Result<String, LlmError>> = parser.collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_deref().ok(), Some("ok"));
        assert!(items[1].is_err());
    }

    #[tokio::test]
    async fn test_stops_at_done_marker() {
        let parser = SseStreamParser::new(body(&["data: one\ndata: [DONE]\ndata: late\n"]));
        let items: Vec<String> = parser.map(|r| r.expect("payload")).collect().await;
        assert_eq!(items, vec!["one"]);
    }

    #[tokio::test]
    async fn test_trailing_line_without_newline() {
        let parser = SseStreamParser::new(body(&[": ping\n", "data: tail"]));
        let items: Vec<String> = parser.map(|r| r.expect("payload")).collect().await;
        assert_eq!(items, vec!["tail"]);
    }
}
