//! Backend health classification

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Health check status levels
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HealthStatus {
    /// Backend answered its liveness probe
    Healthy,
    /// Backend did not answer
    Unhealthy { error: String },
}

impl HealthStatus {
    /// Check if status is healthy
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }

    /// Get status as string
    pub fn as_str(&self) -> &str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Unhealthy { .. } => "unhealthy",
        }
    }
}

/// Result of probing the active queue backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendHealth {
    #[serde(flatten)]
    pub status: HealthStatus,
    /// Which backend answered ("redis" or "memory")
    pub backend: String,
    /// When the probe ran
    pub timestamp: DateTime<Utc>,
}

impl BackendHealth {
    pub fn healthy(backend: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Healthy,
            backend: backend.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn unhealthy(backend: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unhealthy {
                error: error.into(),
            },
            backend: backend.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status.is_healthy()
    }
}
