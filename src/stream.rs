//! Typed chat events on top of SSE frames.
//!
//! [`decode_events`] is the whole read loop: bytes in, [`StreamEvent`]s out.
//! The resulting [`EventStream`] is lazy, finite, and cannot be restarted. It
//! ends on end-of-body, after a `done` event, or after the first error.

use bytes::Bytes;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::pin::Pin;
use tracing::{debug, warn};

use crate::client::ClientError;
use crate::model::{ChatDone, StreamEvent};
use crate::sse::{is_done_marker, SseDecoder, SseFrame};

/// Fallback for an `error` event that carries no message.
pub const GENERATION_FAILED: &str = "Generation failed";

/// Boxed stream of chat events.
pub type EventStream = BoxStream<'static, Result<StreamEvent, ClientError>>;

/// Extension trait turning a `reqwest::Response` into an [`EventStream`].
pub trait ResponseEventsExt {
    fn chat_events(self) -> EventStream;
}

impl ResponseEventsExt for reqwest::Response {
    fn chat_events(self) -> EventStream {
        decode_events(self.bytes_stream())
    }
}

/// Decode one frame.
///
/// Returns `None` for frames that produce nothing: the `[DONE]` sentinel,
/// malformed JSON, unknown or missing event names, and empty deltas.
pub fn decode_event(frame: &SseFrame) -> Option<Result<StreamEvent, ClientError>> {
    if is_done_marker(&frame.data) {
        return None;
    }

    let payload: Value = match serde_json::from_str(&frame.data) {
        Ok(payload) => payload,
        Err(e) => {
            debug!(event = ?frame.event, error = %e, "dropping malformed frame");
            return None;
        }
    };

    match frame.event.as_deref()? {
        "chunk" => delta(&payload).map(|d| Ok(StreamEvent::Chunk(d))),
        "reasoning" => delta(&payload).map(|d| Ok(StreamEvent::Reasoning(d))),
        "context" => Some(Ok(StreamEvent::Context(payload))),
        "done" => Some(Ok(StreamEvent::Done(done_payload(payload)))),
        "error" => {
            let message = payload
                .get("message")
                .and_then(Value::as_str)
                .filter(|m| !m.is_empty())
                .unwrap_or(GENERATION_FAILED);
            Some(Err(ClientError::Server(message.to_string())))
        }
        other => {
            debug!(event = other, "ignoring unknown event");
            None
        }
    }
}

fn delta(payload: &Value) -> Option<String> {
    payload
        .get("delta")
        .and_then(Value::as_str)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
}

fn done_payload(payload: Value) -> ChatDone {
    match serde_json::from_value(payload.clone()) {
        Ok(done) => done,
        Err(e) => {
            warn!(error = %e, "unexpected done payload shape");
            let Value::Object(mut extra) = payload else {
                return ChatDone::default();
            };
            ChatDone {
                chat_id: take_field(&mut extra, "chatId", Value::as_i64),
                message_id: take_field(&mut extra, "messageId", Value::as_i64),
                preview: take_field(&mut extra, "preview", |v| v.as_str().map(str::to_string)),
                extra,
            }
        }
    }
}

/// Move `key` out of `map` when `read` accepts its value; a mistyped value stays put.
fn take_field<T>(
    map: &mut Map<String, Value>,
    key: &str,
    read: impl Fn(&Value) -> Option<T>,
) -> Option<T> {
    let value = read(map.get(key)?)?;
    map.remove(key);
    Some(value)
}

struct DecodeState<S> {
    bytes: Pin<Box<S>>,
    decoder: SseDecoder,
    ready: VecDeque<SseFrame>,
    eof: bool,
    finished: bool,
}

/// Turn a byte stream into an [`EventStream`].
///
/// Events come out in wire order. Dropping the returned stream drops the
/// underlying byte stream, which releases the connection.
///
/// # Example
/// ```
/// use bytes::Bytes;
/// use futures::{stream, StreamExt};
/// use lorechat::client::ClientError;
/// use lorechat::model::StreamEvent;
/// use lorechat::stream::decode_events;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let body = stream::iter(vec![
///     Ok::<_, ClientError>(Bytes::from_static(b"event: chunk\ndata: {\"delta\":\"Hel\"}\n\nevent: ch")),
///     Ok(Bytes::from_static(b"unk\ndata: {\"delta\":\"lo\"}\n\n")),
/// ]);
///
/// let events: Vec<_> = decode_events(body).map(Result::unwrap).collect().await;
/// assert_eq!(events, vec![
///     StreamEvent::Chunk("Hel".to_string()),
///     StreamEvent::Chunk("lo".to_string()),
/// ]);
/// # }
/// ```
pub fn decode_events<S, E>(bytes: S) -> EventStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Into<ClientError> + Send + 'static,
{
    let state = DecodeState {
        bytes: Box::pin(bytes),
        decoder: SseDecoder::new(),
        ready: VecDeque::new(),
        eof: false,
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if state.finished {
                return None;
            }

            while let Some(frame) = state.ready.pop_front() {
                match decode_event(&frame) {
                    None => continue,
                    Some(Ok(event)) => {
                        state.finished = event.is_terminal();
                        return Some((Ok(event), state));
                    }
                    Some(Err(e)) => {
                        state.finished = true;
                        return Some((Err(e), state));
                    }
                }
            }

            if state.eof {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    let frames = state.decoder.push(&chunk);
                    state.ready.extend(frames);
                }
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((Err(e.into()), state));
                }
                None => {
                    state.eof = true;
                    let tail = state.decoder.finish();
                    state.ready.extend(tail);
                }
            }
        }
    })
    .boxed()
}
