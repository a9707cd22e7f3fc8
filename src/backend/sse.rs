//! Server-Sent Events decoding for the push channel.

use futures::{Stream, StreamExt};
use tracing::debug;

use crate::error::{ConsoleError, Result};
use crate::protocol::{DEFAULT_SSE_EVENT, PushEvent};

/// One dispatched SSE frame.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SseFrame {
    event: String,
    data: String,
}

impl SseFrame {
    /// Parse the lines of one frame. Comment-only frames yield `None`.
    fn parse(text: &str) -> Option<Self> {
        let mut event = None;
        let mut data: Option<String> = None;

        for line in text.lines() {
            if line.is_empty() || line.starts_with(':') {
                continue;
            }
            let (field, value) = line.split_once(':').unwrap_or((line, ""));
            let value = value.strip_prefix(' ').unwrap_or(value);
            match field {
                "event" => event = Some(value.to_string()),
                "data" => match &mut data {
                    Some(existing) => {
                        existing.push('\n');
                        existing.push_str(value);
                    }
                    None => data = Some(value.to_string()),
                },
                _ => {}
            }
        }

        if event.is_none() && data.is_none() {
            return None;
        }
        Some(Self {
            event: event.unwrap_or_else(|| DEFAULT_SSE_EVENT.to_string()),
            data: data.unwrap_or_default(),
        })
    }
}

/// Decode a raw `text/event-stream` body into push events.
///
/// Unknown event names are skipped, malformed payloads are yielded as errors
/// without ending the stream, and a transport error is yielded once before
/// the stream ends.
pub fn decode_push_stream<S, B, E>(bytes: S) -> impl Stream<Item = Result<PushEvent>> + Send + 'static
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: Into<ConsoleError> + Send,
{
    async_stream::stream! {
        let mut buf = Vec::<u8>::new();

        futures::pin_mut!(bytes);
        while let Some(chunk) = bytes.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    yield Err::<PushEvent, ConsoleError>(err.into());
                    break;
                }
            };
            buf.extend(chunk.as_ref().iter().copied().filter(|b| *b != b'\r'));

            while let Some(pos) = find_double_newline(&buf) {
                let raw = buf.drain(..pos + 2).collect::<Vec<_>>();
                let Some(frame) = SseFrame::parse(&String::from_utf8_lossy(&raw)) else {
                    continue;
                };
                match PushEvent::decode(&frame.event, &frame.data) {
                    Ok(Some(event)) => yield Ok(event),
                    Ok(None) => debug!(event = %frame.event, "Ignoring unknown push event"),
                    Err(err) => yield Err(err),
                }
            }
        }
    }
}

/// Find the position of a double newline in the buffer.
fn find_double_newline(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\n\n")
}
