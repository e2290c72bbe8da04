//! Dead letter records for messages that could not be enqueued.
//!
//! Entries are normally stored in the backend under `queue:{agent}:dlq`.
//! When even that write fails, the entry is kept in a [`DeadLetterSpill`]
//! owned by the queue service so that no failed message goes unrecorded.
//! Neither store expires entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{QueueError, QueueResult};
use crate::message::QueueMessage;
use crate::types::AgentId;

/// A message in the dead letter queue together with why it ended up there
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DlqEntry {
    /// The original message
    pub message: QueueMessage,
    /// Failure reason (backend error text)
    pub error: String,
    /// When the message was dead-lettered
    pub timestamp: DateTime<Utc>,
}

impl DlqEntry {
    /// Create a new DLQ entry stamped with the current time
    pub fn new(message: QueueMessage, error: impl Into<String>) -> Self {
        Self {
            message,
            error: error.into(),
            timestamp: Utc::now(),
        }
    }

    /// Serialize entry to JSON
    pub fn to_json(&self) -> QueueResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize entry from JSON
    pub fn from_json(json: &str) -> QueueResult<Self> {
        serde_json::from_str(json).map_err(|e| QueueError::Deserialization(e.to_string()))
    }
}

/// In-process holding area for DLQ entries the backend refused
#[derive(Debug, Default)]
pub struct DeadLetterSpill {
    entries: RwLock<HashMap<AgentId, Vec<DlqEntry>>>,
}

impl DeadLetterSpill {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry under its recipient
    pub async fn push(&self, entry: DlqEntry) {
        let mut entries = self.entries.write().await;
        let recipient = entry.message.recipient.clone();
        let bucket = entries.entry(recipient).or_default();
        bucket.push(entry);
        debug!("Spilled DLQ entry in-process (total for recipient: {})", bucket.len());
    }

    /// All spilled entries for an agent, oldest first
    pub async fn list(&self, agent: &AgentId) -> Vec<DlqEntry> {
        self.entries
            .read()
            .await
            .get(agent)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of spilled entries for an agent
    pub async fn len(&self, agent: &AgentId) -> usize {
        self.entries.read().await.get(agent).map_or(0, Vec::len)
    }

    /// Agents that have at least one spilled entry
    pub async fn agents(&self) -> Vec<AgentId> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|(_, bucket)| !bucket.is_empty())
            .map(|(agent, _)| agent.clone())
            .collect()
    }
}
