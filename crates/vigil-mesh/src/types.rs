//! Agent naming and the queue key scheme derived from it

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Prefix shared by every queue key
pub const QUEUE_PREFIX: &str = "queue:";

/// Suffix appended to a primary queue key to form its dead-letter key
pub const DLQ_SUFFIX: &str = ":dlq";

/// Error type for agent name validation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdValidationError {
    /// The ID string is empty
    #[error("ID cannot be empty")]
    Empty,
    /// The ID contains only whitespace
    #[error("ID cannot be whitespace-only")]
    WhitespaceOnly,
    /// The ID has leading or trailing whitespace
    #[error("ID cannot have leading or trailing whitespace")]
    LeadingTrailingWhitespace,
    /// The ID contains invalid characters
    #[error("ID can only contain alphanumeric characters, hyphens, underscores, and dots")]
    InvalidCharacters,
}

/// Name of an agent, which doubles as the name of its inbound queue.
///
/// Valid names are non-empty and contain only alphanumerics, hyphens,
/// underscores and dots. In particular a name never contains `:`, so
/// `queue:{name}` and `queue:{name}:dlq` can always be told apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AgentId(String);

impl AgentId {
    /// Parse and validate an agent name
    ///
    /// # Examples
    ///
    /// ```
    /// use vigil_mesh::AgentId;
    ///
    /// assert!(AgentId::parse("watchtower").is_ok());
    /// assert!(AgentId::parse("agent.123").is_ok());
    ///
    /// assert!(AgentId::parse("").is_err());
    /// assert!(AgentId::parse(" agent").is_err());
    /// assert!(AgentId::parse("auditor:dlq").is_err());
    /// ```
    pub fn parse(id: impl AsRef<str>) -> Result<Self, IdValidationError> {
        let s = id.as_ref();

        if s.is_empty() {
            return Err(IdValidationError::Empty);
        }

        if s.trim().is_empty() {
            return Err(IdValidationError::WhitespaceOnly);
        }

        if s != s.trim() {
            return Err(IdValidationError::LeadingTrailingWhitespace);
        }

        if !s
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.')
        {
            return Err(IdValidationError::InvalidCharacters);
        }

        Ok(Self(s.to_string()))
    }

    /// Get the agent name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Backend key of this agent's primary queue (`queue:{name}`)
    pub fn queue_key(&self) -> String {
        format!("{QUEUE_PREFIX}{}", self.0)
    }

    /// Backend key of this agent's dead-letter queue (`queue:{name}:dlq`)
    pub fn dlq_key(&self) -> String {
        format!("{QUEUE_PREFIX}{}{DLQ_SUFFIX}", self.0)
    }

    /// Recover the agent name from a primary queue key.
    ///
    /// Returns `None` for dead-letter keys and for keys outside the scheme.
    pub fn from_queue_key(key: &str) -> Option<Self> {
        let name = key.strip_prefix(QUEUE_PREFIX)?;
        if name.ends_with(DLQ_SUFFIX) {
            return None;
        }
        Self::parse(name).ok()
    }
}

impl FromStr for AgentId {
    type Err = IdValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for AgentId {
    type Error = IdValidationError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for AgentId {
    type Error = IdValidationError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl From<AgentId> for String {
    fn from(id: AgentId) -> Self {
        id.0
    }
}

impl AsRef<str> for AgentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
