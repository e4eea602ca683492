//! Chat composer state as an explicit context object.
//!
//! A [`Composer`] owns everything one conversation view needs while a reply
//! streams in: the transcript, the partial assistant draft, reasoning, the
//! latest retrieval context, and a status. Nothing here is global. The
//! durable part ([`ComposerSnapshot`]) crosses an explicit save/load
//! boundary; the draft and status never hit disk.

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::client::{ChatStreamer, ClientError};
use crate::model::{ChatDone, StreamEvent, StreamRequest};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One committed message in the transcript.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub message_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComposerStatus {
    Idle,
    Streaming,
    /// The last exchange failed; holds the message shown to the user.
    Failed(String),
}

/// The persisted part of a [`Composer`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ComposerSnapshot {
    /// Backend chat id, known once the first exchange completes.
    pub chat_id: Option<i64>,
    /// Title sent when the backend creates the chat.
    pub title: Option<String>,
    pub system: Option<String>,
    pub character_id: Option<i64>,
    #[serde(default)]
    pub lore_ids: Vec<i64>,
    #[serde(default)]
    pub transcript: Vec<Turn>,
}

#[derive(Debug, Clone)]
pub struct Composer {
    snapshot: ComposerSnapshot,
    draft: String,
    reasoning: String,
    context: Option<Value>,
    status: ComposerStatus,
}

impl Default for Composer {
    fn default() -> Self {
        Self::from_snapshot(ComposerSnapshot::default())
    }
}

impl Composer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: ComposerSnapshot) -> Self {
        Self {
            snapshot,
            draft: String::new(),
            reasoning: String::new(),
            context: None,
            status: ComposerStatus::Idle,
        }
    }

    pub fn snapshot(&self) -> &ComposerSnapshot {
        &self.snapshot
    }

    /// Conversation settings (system prompt, character, lore) for later requests.
    pub fn settings_mut(&mut self) -> &mut ComposerSnapshot {
        &mut self.snapshot
    }

    pub fn chat_id(&self) -> Option<i64> {
        self.snapshot.chat_id
    }

    pub fn transcript(&self) -> &[Turn] {
        &self.snapshot.transcript
    }

    /// Assistant output received so far for the in-flight exchange.
    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }

    pub fn context(&self) -> Option<&Value> {
        self.context.as_ref()
    }

    pub fn status(&self) -> &ComposerStatus {
        &self.status
    }

    pub fn is_streaming(&self) -> bool {
        self.status == ComposerStatus::Streaming
    }

    /// Build a request bound to this conversation.
    ///
    /// The title only goes out while the chat has no id yet.
    pub fn request(&self, model: impl Into<String>, message: impl Into<String>) -> StreamRequest {
        let snapshot = &self.snapshot;
        StreamRequest {
            chat_id: snapshot.chat_id,
            model: model.into(),
            message: message.into(),
            system: snapshot.system.clone(),
            character_id: snapshot.character_id,
            lore_ids: (!snapshot.lore_ids.is_empty()).then(|| snapshot.lore_ids.clone()),
            title: snapshot
                .title
                .clone()
                .filter(|_| snapshot.chat_id.is_none()),
        }
    }

    /// Record the user's message and start a fresh draft.
    pub fn begin(&mut self, message: &str) {
        self.snapshot.transcript.push(Turn {
            role: Role::User,
            content: message.to_string(),
            message_id: None,
        });
        self.clear_partial();
        self.context = None;
        self.status = ComposerStatus::Streaming;
    }

    pub fn apply(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::Chunk(delta) => self.draft.push_str(delta),
            StreamEvent::Reasoning(delta) => self.reasoning.push_str(delta),
            StreamEvent::Context(context) => self.context = Some(context.clone()),
            StreamEvent::Done(done) => self.complete(done.chat_id, done.message_id),
        }
    }

    /// Drop partial output and remember why.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.clear_partial();
        self.status = ComposerStatus::Failed(message.into());
    }

    /// Drop partial output without reporting anything.
    pub fn cancel(&mut self) {
        self.clear_partial();
        self.status = ComposerStatus::Idle;
    }

    /// Run one exchange on `streamer`, applying every event as it arrives.
    ///
    /// Returns the `done` payload, or `None` when the body ended without one.
    /// Cancelling `cancel` clears the draft and yields
    /// [`ClientError::StreamCancelled`].
    pub async fn run<S>(
        &mut self,
        streamer: &S,
        request: StreamRequest,
        cancel: &CancellationToken,
    ) -> Result<Option<ChatDone>, ClientError>
    where
        S: ChatStreamer + ?Sized,
    {
        request.validate()?;
        self.begin(&request.message);

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ClientError::StreamCancelled),
            opened = streamer.open_stream(request) => opened,
        };
        let mut events = match opened {
            Ok(events) => events,
            Err(e) => return Err(self.abort(e)),
        };

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(self.abort(ClientError::StreamCancelled)),
                next = events.next() => next,
            };

            match next {
                Some(Ok(event)) => {
                    self.apply(&event);
                    if let StreamEvent::Done(done) = event {
                        return Ok(Some(done));
                    }
                }
                Some(Err(e)) => return Err(self.abort(e)),
                None => {
                    debug!("stream ended without done event; keeping draft");
                    self.complete(None, None);
                    return Ok(None);
                }
            }
        }
    }

    /// Write the durable state as JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ClientError> {
        let json = serde_json::to_string_pretty(&self.snapshot)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ClientError> {
        let text = std::fs::read_to_string(path)?;
        let snapshot: ComposerSnapshot = serde_json::from_str(&text)?;
        Ok(Self::from_snapshot(snapshot))
    }

    fn complete(&mut self, chat_id: Option<i64>, message_id: Option<i64>) {
        let content = std::mem::take(&mut self.draft);
        self.snapshot.transcript.push(Turn {
            role: Role::Assistant,
            content,
            message_id,
        });
        if chat_id.is_some() {
            self.snapshot.chat_id = chat_id;
        }
        self.status = ComposerStatus::Idle;
        info!(chat_id = ?self.snapshot.chat_id, turns = self.snapshot.transcript.len(), "exchange committed");
    }

    fn abort(&mut self, error: ClientError) -> ClientError {
        match &error {
            ClientError::StreamCancelled => self.cancel(),
            other => self.fail(other.callback_message()),
        }
        error
    }

    fn clear_partial(&mut self) {
        self.draft.clear();
        self.reasoning.clear();
    }
}
