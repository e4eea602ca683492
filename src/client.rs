//! The streaming chat client and its error type.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{StatusCode, Url};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::callbacks::{spawn_stream, StreamCallbacks, StreamHandle};
use crate::http::{add_extra_headers, build_http_client, chat_stream_url};
use crate::model::StreamRequest;
use crate::options::TransportOptions;
use crate::stream::{EventStream, ResponseEventsExt};

/// Fallback for a transport failure that carries no message.
pub const STREAM_FAILED: &str = "Stream failed";

/// Errors that can occur during client operations.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// The backend answered with a non-success status, or without a body.
    #[error("Request rejected ({status}): {message}")]
    Rejected { status: StatusCode, message: String },

    /// The backend sent an `error` event.
    #[error("Server error: {0}")]
    Server(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Stream cancelled")]
    StreamCancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// The message handed to [`StreamCallbacks::on_error`].
    ///
    /// Rejections carry the response body verbatim and server errors carry
    /// the event's `message`. Transport failures use the underlying error's
    /// own text, falling back to [`STREAM_FAILED`].
    pub fn callback_message(&self) -> String {
        let message = match self {
            ClientError::Rejected { message, .. } | ClientError::Server(message) => {
                return message.clone()
            }
            ClientError::Http(e) => e.to_string(),
            ClientError::Io(e) => e.to_string(),
            other => other.to_string(),
        };

        if message.trim().is_empty() {
            STREAM_FAILED.to_string()
        } else {
            message
        }
    }
}

/// Anything that can open a chat event stream.
///
/// [`StreamClient`] is the HTTP implementation. The trait is the seam that
/// lets [`Composer`](crate::composer::Composer) and the callback driver run
/// against other sources.
#[async_trait]
pub trait ChatStreamer: Send + Sync {
    /// Issue `request` and return its events once the response is accepted.
    async fn open_stream(&self, request: StreamRequest) -> Result<EventStream, ClientError>;
}

/// HTTP client for `POST {base}/chat/stream`.
///
/// Cheap to clone; clones share the connection pool and cookie store.
///
/// # Example
/// ```no_run
/// use lorechat::callbacks::StreamCallbacks;
/// use lorechat::client::StreamClient;
/// use lorechat::model::{ChatDone, StreamRequest};
/// use lorechat::options::TransportOptions;
///
/// struct Printer;
///
/// impl StreamCallbacks for Printer {
///     fn on_chunk(&mut self, delta: &str) {
///         print!("{delta}");
///     }
///
///     fn on_done(&mut self, done: &ChatDone) {
///         println!("\n[chat {:?}]", done.chat_id);
///     }
/// }
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = StreamClient::new(TransportOptions::new("http://localhost:8080/api"))?;
///     let mut handle = client.stream(StreamRequest::new("gpt-4o", "Hello!"), Printer)?;
///     handle.join().await;
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct StreamClient {
    http: reqwest::Client,
    url: Url,
    extra_headers: Option<HashMap<String, String>>,
}

impl StreamClient {
    pub fn new(transport_options: TransportOptions) -> Result<Self, ClientError> {
        let url = chat_stream_url(&transport_options.base_url)?;
        let http = build_http_client(&transport_options)?;

        Ok(Self {
            http,
            url,
            extra_headers: transport_options.extra_headers,
        })
    }

    /// The endpoint this client posts to.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Send `request` and return its event stream.
    ///
    /// Fails with [`ClientError::Rejected`] on a non-success status; the
    /// message is the response body, or the status reason when the body is
    /// empty.
    pub async fn open(&self, request: &StreamRequest) -> Result<EventStream, ClientError> {
        request.validate()?;

        info!(
            model = %request.model,
            chat_id = ?request.chat_id,
            "opening chat stream"
        );

        let mut req = self
            .http
            .post(self.url.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "text/event-stream");

        req = add_extra_headers(req, &self.extra_headers);

        let response = req.json(request).send().await?;
        let status = response.status();
        debug!(%status, "chat stream response");

        if !status.is_success() || status == StatusCode::NO_CONTENT {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, "chat stream rejected");
            return Err(Self::handle_error_response(status, body));
        }

        Ok(response.chat_events())
    }

    /// Start streaming `request` in the background, reporting to `callbacks`.
    ///
    /// Must be called from within a tokio runtime. An invalid request is
    /// returned immediately; every later failure goes to
    /// [`StreamCallbacks::on_error`] exactly once, unless the returned handle
    /// is cancelled first.
    pub fn stream<C>(
        &self,
        request: StreamRequest,
        callbacks: C,
    ) -> Result<StreamHandle, ClientError>
    where
        C: StreamCallbacks,
    {
        request.validate()?;
        Ok(spawn_stream(self.clone(), request, callbacks))
    }

    fn handle_error_response(status: StatusCode, body: String) -> ClientError {
        let message = if body.trim().is_empty() {
            status
                .canonical_reason()
                .unwrap_or("Request failed")
                .to_string()
        } else {
            body
        };
        ClientError::Rejected { status, message }
    }
}

#[async_trait]
impl ChatStreamer for StreamClient {
    async fn open_stream(&self, request: StreamRequest) -> Result<EventStream, ClientError> {
        self.open(&request).await
    }
}
