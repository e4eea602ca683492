//! Callback-style consumption of a chat stream, with cancellation.
//!
//! [`spawn_stream`] runs the read loop as a single tokio task. Callbacks fire
//! on that task in wire order. At most one of `on_done`/`on_error` fires, and
//! nothing fires once [`StreamHandle::cancel`] has been called.

use futures::StreamExt;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::ChatStreamer;
use crate::model::{ChatDone, StreamEvent, StreamRequest};

/// Receiver of stream events. Every method defaults to a no-op.
pub trait StreamCallbacks: Send + 'static {
    fn on_chunk(&mut self, _delta: &str) {}

    fn on_reasoning(&mut self, _delta: &str) {}

    fn on_context(&mut self, _context: &Value) {}

    /// Terminal. Nothing fires after it.
    fn on_done(&mut self, _done: &ChatDone) {}

    /// Terminal. Nothing fires after it.
    fn on_error(&mut self, _message: &str) {}
}

/// Caller-owned handle to a running stream.
///
/// Dropping the handle leaves the stream running; call [`cancel`](Self::cancel)
/// to stop it.
#[derive(Debug)]
pub struct StreamHandle {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl StreamHandle {
    /// Abort the request. No callback fires afterwards, not even `on_error`.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait until the read loop has exited and released the response body.
    ///
    /// Returns immediately once the loop has already been joined.
    pub async fn join(&mut self) {
        let Some(task) = self.task.as_mut() else {
            return;
        };
        let result = task.await;
        self.task = None;
        if let Err(e) = result {
            warn!(error = %e, "chat stream task failed");
        }
    }
}

/// Open `request` on `streamer` in a background task and feed `callbacks`.
pub fn spawn_stream<S, C>(streamer: S, request: StreamRequest, callbacks: C) -> StreamHandle
where
    S: ChatStreamer + 'static,
    C: StreamCallbacks,
{
    let token = CancellationToken::new();
    let task = tokio::spawn(drive(streamer, request, callbacks, token.clone()));
    StreamHandle {
        token,
        task: Some(task),
    }
}

async fn drive<S, C>(streamer: S, request: StreamRequest, mut callbacks: C, token: CancellationToken)
where
    S: ChatStreamer,
    C: StreamCallbacks,
{
    let opened = tokio::select! {
        biased;
        _ = token.cancelled() => {
            debug!("chat stream cancelled before response");
            return;
        }
        opened = streamer.open_stream(request) => opened,
    };

    let mut events = match opened {
        Ok(events) => events,
        Err(e) => {
            callbacks.on_error(&e.callback_message());
            return;
        }
    };

    loop {
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!("chat stream cancelled");
                return;
            }
            next = events.next() => next,
        };

        // A cancel that lands while the body is being polled still wins.
        if token.is_cancelled() {
            debug!("chat stream cancelled during read");
            return;
        }

        match next {
            Some(Ok(StreamEvent::Chunk(delta))) => callbacks.on_chunk(&delta),
            Some(Ok(StreamEvent::Reasoning(delta))) => callbacks.on_reasoning(&delta),
            Some(Ok(StreamEvent::Context(context))) => callbacks.on_context(&context),
            Some(Ok(StreamEvent::Done(done))) => {
                info!(chat_id = ?done.chat_id, message_id = ?done.message_id, "generation finished");
                callbacks.on_done(&done);
                return;
            }
            Some(Err(e)) => {
                warn!(error = %e, "chat stream failed");
                callbacks.on_error(&e.callback_message());
                return;
            }
            None => {
                debug!("chat stream ended without done event");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientError;
    use crate::stream::{decode_events, EventStream};
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::channel::mpsc;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<String>>>);

    impl Recorder {
        fn calls(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }

        fn push(&self, call: String) {
            self.0.lock().unwrap().push(call);
        }
    }

    impl StreamCallbacks for Recorder {
        fn on_chunk(&mut self, delta: &str) {
            self.push(format!("chunk:{delta}"));
        }

        fn on_reasoning(&mut self, delta: &str) {
            self.push(format!("reasoning:{delta}"));
        }

        fn on_context(&mut self, context: &Value) {
            self.push(format!("context:{context}"));
        }

        fn on_done(&mut self, done: &ChatDone) {
            self.push(format!("done:{:?}", done.chat_id));
        }

        fn on_error(&mut self, message: &str) {
            self.push(format!("error:{message}"));
        }
    }

    /// Streamer whose body is fed by the test through a channel.
    struct ChannelStreamer {
        body: Mutex<Option<mpsc::UnboundedReceiver<Result<Bytes, ClientError>>>>,
    }

    impl ChannelStreamer {
        fn new() -> (Self, mpsc::UnboundedSender<Result<Bytes, ClientError>>) {
            let (tx, rx) = mpsc::unbounded();
            let streamer = Self {
                body: Mutex::new(Some(rx)),
            };
            (streamer, tx)
        }
    }

    #[async_trait]
    impl ChatStreamer for ChannelStreamer {
        async fn open_stream(&self, _request: StreamRequest) -> Result<EventStream, ClientError> {
            let body = self.body.lock().unwrap().take().ok_or(ClientError::StreamCancelled)?;
            Ok(decode_events(body))
        }
    }

    struct RejectingStreamer;

    #[async_trait]
    impl ChatStreamer for RejectingStreamer {
        async fn open_stream(&self, _request: StreamRequest) -> Result<EventStream, ClientError> {
            Err(ClientError::Rejected {
                status: reqwest::StatusCode::BAD_GATEWAY,
                message: "upstream down".to_string(),
            })
        }
    }

    fn send(tx: &mpsc::UnboundedSender<Result<Bytes, ClientError>>, text: &'static str) {
        tx.unbounded_send(Ok(Bytes::from_static(text.as_bytes()))).unwrap();
    }

    async fn wait_for_calls(recorder: &Recorder, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while recorder.calls().len() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("callbacks did not arrive in time");
    }

    fn request() -> StreamRequest {
        StreamRequest::new("model", "hello")
    }

    #[tokio::test]
    async fn test_callbacks_fire_in_order() {
        let (streamer, tx) = ChannelStreamer::new();
        let recorder = Recorder::default();
        let mut handle = spawn_stream(streamer, request(), recorder.clone());

        send(&tx, "event: context\ndata: {\"lore\":1}\n\nevent: reasoning\ndata: {\"delta\":\"hm\"}\n\n");
        send(&tx, "event: chunk\ndata: {\"delta\":\"Hel\"}\n\nevent: chunk\ndata: {\"de");
        send(&tx, "lta\":\"lo\"}\n\nevent: done\ndata: {\"chatId\":42}\n\n");
        send(&tx, "event: chunk\ndata: {\"delta\":\"ignored\"}\n\n");
        drop(tx);

        handle.join().await;
        assert_eq!(
            recorder.calls(),
            vec![
                "context:{\"lore\":1}",
                "reasoning:hm",
                "chunk:Hel",
                "chunk:lo",
                "done:Some(42)",
            ]
        );
    }

    #[tokio::test]
    async fn test_rejection_reports_error_once() {
        let recorder = Recorder::default();
        let mut handle = spawn_stream(RejectingStreamer, request(), recorder.clone());

        handle.join().await;
        assert_eq!(recorder.calls(), vec!["error:upstream down"]);
    }

    #[tokio::test]
    async fn test_transport_error_reports_error() {
        let (streamer, tx) = ChannelStreamer::new();
        let recorder = Recorder::default();
        let mut handle = spawn_stream(streamer, request(), recorder.clone());

        send(&tx, "event: chunk\ndata: {\"delta\":\"a\"}\n\n");
        tx.unbounded_send(Err(ClientError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "body closed early",
        ))))
        .unwrap();

        handle.join().await;
        assert_eq!(recorder.calls(), vec!["chunk:a", "error:body closed early"]);
    }

    #[tokio::test]
    async fn test_cancel_before_response_is_silent() {
        let recorder = Recorder::default();
        let mut handle = spawn_stream(RejectingStreamer, request(), recorder.clone());
        handle.cancel();
        assert!(handle.is_cancelled());

        handle.join().await;
        assert!(recorder.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_mid_stream_suppresses_everything_after() {
        let (streamer, tx) = ChannelStreamer::new();
        let recorder = Recorder::default();
        let mut handle = spawn_stream(streamer, request(), recorder.clone());

        send(&tx, "event: chunk\ndata: {\"delta\":\"first\"}\n\n");
        wait_for_calls(&recorder, 1).await;

        handle.cancel();
        send(&tx, "event: chunk\ndata: {\"delta\":\"second\"}\n\n");
        send(&tx, "event: error\ndata: {\"message\":\"late\"}\n\n");

        handle.join().await;
        assert_eq!(recorder.calls(), vec!["chunk:first"]);
        drop(tx);
    }

    /// Streamer whose body blocks its worker thread on every poll before
    /// yielding a chunk.
    struct SlowStreamer;

    #[async_trait]
    impl ChatStreamer for SlowStreamer {
        async fn open_stream(&self, _request: StreamRequest) -> Result<EventStream, ClientError> {
            let body = futures::stream::poll_fn(|_| {
                std::thread::sleep(Duration::from_millis(200));
                std::task::Poll::Ready(Some(Ok(StreamEvent::Chunk("late".to_string()))))
            });
            Ok(body.boxed())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_during_read_suppresses_dispatch() {
        let recorder = Recorder::default();
        let mut handle = spawn_stream(SlowStreamer, request(), recorder.clone());

        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.cancel();
        handle.join().await;

        assert!(recorder.calls().is_empty());
    }

    #[tokio::test]
    async fn test_join_twice_returns() {
        let recorder = Recorder::default();
        let mut handle = spawn_stream(RejectingStreamer, request(), recorder.clone());

        handle.join().await;
        handle.join().await;
        assert_eq!(recorder.calls(), vec!["error:upstream down"]);
    }

    #[tokio::test]
    async fn test_end_of_body_without_done_is_silent() {
        let (streamer, tx) = ChannelStreamer::new();
        let recorder = Recorder::default();
        let mut handle = spawn_stream(streamer, request(), recorder.clone());

        send(&tx, "event: chunk\ndata: {\"delta\":\"only\"}\n\ndata: [DONE]\n\n");
        drop(tx);

        handle.join().await;
        assert_eq!(recorder.calls(), vec!["chunk:only"]);
    }
}
