//! Queue message envelope exchanged between agents.
//!
//! Every message carries a structured payload map whose single well-known
//! top-level key names its semantic type (for example `disaster_event` or
//! `verified_event`). The envelope is stored in the backend as JSON text.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{QueueError, QueueResult};
use crate::types::AgentId;

/// Structured payload carried by a message
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Opaque unique identifier for a message
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Create a new random message ID (UUID v4)
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wrap a caller-supplied identifier.
    ///
    /// An empty string yields a freshly generated ID.
    pub fn from_string(id: impl Into<String>) -> Self {
        let id = id.into();
        if id.is_empty() { Self::new() } else { Self(id) }
    }

    /// Get the message ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message sitting in (or travelling to) a recipient's queue.
///
/// Immutable once built except for `retry_count`, which only the retry path
/// increments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueMessage {
    /// Unique message identifier
    pub message_id: MessageId,
    /// Agent that produced the message
    pub sender: AgentId,
    /// Agent whose queue the message belongs to
    pub recipient: AgentId,
    /// Message payload
    pub payload: Payload,
    /// When the message was created
    pub timestamp: DateTime<Utc>,
    /// How many times the message has been republished
    #[serde(default)]
    pub retry_count: u32,
}

impl QueueMessage {
    /// Create a message with a freshly generated ID
    pub fn new(sender: AgentId, recipient: AgentId, payload: Payload) -> Self {
        Self {
            message_id: MessageId::new(),
            sender,
            recipient,
            payload,
            timestamp: Utc::now(),
            retry_count: 0,
        }
    }

    /// Replace the generated ID with a caller-supplied one
    pub fn with_message_id(mut self, id: MessageId) -> Self {
        self.message_id = id;
        self
    }

    /// The well-known top-level key identifying the payload's semantic type
    pub fn kind(&self) -> Option<&str> {
        self.payload.keys().next().map(String::as_str)
    }

    /// Serialize message to JSON
    pub fn to_json(&self) -> QueueResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize message from JSON
    pub fn from_json(json: &str) -> QueueResult<Self> {
        serde_json::from_str(json).map_err(|e| QueueError::Deserialization(e.to_string()))
    }
}
