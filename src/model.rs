//! Request and event types for the chat streaming protocol.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::client::ClientError;

/// Parameters of one `POST /chat/stream` call.
///
/// Serializes to the backend's wire names (`chatId`, `characterId`, `loreIds`, ...).
/// Entity ids are opaque integers minted by the backend.
///
/// # Example
/// ```rust
/// use lorechat::model::StreamRequest;
///
/// let request = StreamRequest::new("gpt-4o", "Continue the scene.")
///     .with_chat(12)
///     .with_lore(vec![3, 5]);
///
/// let body = serde_json::to_value(&request).unwrap();
/// assert_eq!(body["chatId"], 12);
/// assert_eq!(body["loreIds"], serde_json::json!([3, 5]));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StreamRequest {
    /// Existing chat to append to. Absent means the server starts a new chat.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub chat_id: Option<i64>,

    pub model: String,

    pub message: String,

    #[serde(default)]
    pub system: Option<String>,

    #[serde(default)]
    pub character_id: Option<i64>,

    #[serde(default)]
    pub lore_ids: Option<Vec<i64>>,

    #[serde(default)]
    pub title: Option<String>,
}

impl StreamRequest {
    pub fn new(model: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            chat_id: None,
            model: model.into(),
            message: message.into(),
            system: None,
            character_id: None,
            lore_ids: None,
            title: None,
        }
    }

    pub fn with_chat(mut self, chat_id: i64) -> Self {
        self.chat_id = Some(chat_id);
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_character(mut self, character_id: i64) -> Self {
        self.character_id = Some(character_id);
        self
    }

    pub fn with_lore(mut self, lore_ids: Vec<i64>) -> Self {
        self.lore_ids = Some(lore_ids);
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// `model` and `message` must be non-empty.
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.model.trim().is_empty() {
            return Err(ClientError::InvalidRequest("model is required".to_string()));
        }
        if self.message.trim().is_empty() {
            return Err(ClientError::InvalidRequest("message is required".to_string()));
        }
        Ok(())
    }
}

/// Payload of the terminal `done` event.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatDone {
    #[serde(default)]
    pub chat_id: Option<i64>,

    #[serde(default)]
    pub message_id: Option<i64>,

    #[serde(default)]
    pub preview: Option<String>,

    /// Fields the backend sent that have no dedicated slot.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A typed event decoded from the stream.
///
/// A server-side `error` event is not a variant: it surfaces as
/// `Err(ClientError::Server(_))` and ends the stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A fragment of assistant output.
    Chunk(String),

    /// A fragment of model reasoning.
    Reasoning(String),

    /// Retrieval context the backend attached to this generation.
    Context(Value),

    /// The generation finished; always the last event.
    Done(ChatDone),
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done(_))
    }
}
