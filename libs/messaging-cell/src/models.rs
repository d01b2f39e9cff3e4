// libs/messaging-cell/src/models.rs
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use shared_models::error::{AppError, Notice};

// ==============================================================================
// CORE MESSAGING MODELS
// ==============================================================================

/// The unique thread between two participants. Sides carry no meaning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conversation {
    pub id: String,
    pub user1_id: String,
    pub user2_id: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Conversation {
    pub fn involves(&self, user_id: &str) -> bool {
        self.user1_id == user_id || self.user2_id == user_id
    }

    /// True when the stored sides are exactly `{a, b}` in either order.
    pub fn is_between(&self, a: &str, b: &str) -> bool {
        (self.user1_id == a && self.user2_id == b) || (self.user1_id == b && self.user2_id == a)
    }

    pub fn counterpart_of(&self, user_id: &str) -> Option<&str> {
        if self.user1_id == user_id {
            Some(&self.user2_id)
        } else if self.user2_id == user_id {
            Some(&self.user1_id)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_read: bool,
}

impl Message {
    pub fn is_unread_for(&self, user_id: &str) -> bool {
        self.recipient_id == user_id && !self.is_read
    }
}

/// Row written by the sender; id and timestamp are assigned by the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewMessage {
    pub conversation_id: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub content: String,
    pub is_read: bool,
}

/// The other side of a conversation as the view knows it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Counterpart {
    pub id: String,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
}

impl Counterpart {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            avatar_url: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_avatar(mut self, avatar_url: impl Into<String>) -> Self {
        self.avatar_url = Some(avatar_url.into());
        self
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("User")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Avatar {
    Image(String),
    Initials(String),
}

/// Consecutive messages that share a local calendar day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayGroup {
    pub date: NaiveDate,
    pub header: String,
    pub messages: Vec<Message>,
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveConversationRequest {
    pub counterpart_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveConversationResponse {
    pub conversation_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub recipient_id: String,
    pub content: String,
}

/// Frames pushed to live websocket clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveEvent {
    History { messages: Vec<Message> },
    Message { message: Message },
    Error { notice: Notice },
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MessagingError {
    #[error("Sign in to use messaging")]
    AuthRequired,

    #[error("A conversation needs two different participants")]
    InvalidParticipant,

    #[error("Message is empty")]
    EmptyMessage,

    #[error("No conversation is open")]
    NoConversation,

    #[error("A message is already being sent")]
    SendInFlight,

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Failed to send message: {0}")]
    SendError(String),

    #[error("Live updates unavailable: {0}")]
    SubscriptionError(String),
}

impl MessagingError {
    /// The user-facing notification for this failure.
    pub fn notice(&self) -> Notice {
        match self {
            MessagingError::AuthRequired => Notice::new("Authentication Required", "Please log in to send messages"),
            MessagingError::InvalidParticipant => Notice::new("Error", self.to_string()),
            MessagingError::EmptyMessage => Notice::new("Empty message", "Type a message before sending"),
            MessagingError::NoConversation => Notice::new("Error", "Failed to load conversation"),
            MessagingError::SendInFlight => Notice::new("Please wait", "Your previous message is still being sent"),
            MessagingError::StorageError(cause) => Notice::new("Error loading messages", cause.clone()),
            MessagingError::SendError(cause) => Notice::new("Failed to send message", cause.clone()),
            MessagingError::SubscriptionError(cause) => Notice::new("Live updates unavailable", cause.clone()),
        }
    }
}

impl From<MessagingError> for AppError {
    fn from(err: MessagingError) -> Self {
        match err {
            MessagingError::AuthRequired => AppError::Auth(err.to_string()),
            MessagingError::InvalidParticipant
            | MessagingError::EmptyMessage
            | MessagingError::NoConversation => AppError::BadRequest(err.to_string()),
            MessagingError::SendInFlight => AppError::Conflict(err.to_string()),
            MessagingError::StorageError(msg) => AppError::Database(msg),
            MessagingError::SendError(msg) => AppError::Database(msg),
            MessagingError::SubscriptionError(msg) => AppError::ExternalService(msg),
        }
    }
}
