use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::info;
use vigil_mesh::Payload;

use crate::agent::Agent;
use crate::context::AgentContext;
use crate::error::{AgentError, AgentResult};
use crate::payload::{self, TREASURER, VERIFIED_EVENT};

/// Last stage of the pipeline: records a funding decision for every
/// verified event.
#[derive(Debug, Clone, Default)]
pub struct TreasurerAgent;

impl TreasurerAgent {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Agent for TreasurerAgent {
    fn name(&self) -> &str {
        TREASURER
    }

    async fn process_message(
        &self,
        payload: &Payload,
        _ctx: &AgentContext,
    ) -> AgentResult<Option<Payload>> {
        if !payload.contains_key(VERIFIED_EVENT) {
            return Ok(None);
        }
        let event = payload::object(payload, VERIFIED_EVENT).ok_or_else(|| {
            AgentError::Processing(format!("{VERIFIED_EVENT} must be an object"))
        })?;

        let event_id = event.get("id").cloned().unwrap_or(Value::Null);
        let score = event.get("verification_score").cloned().unwrap_or(Value::Null);
        info!(event_id = %event_id, verification_score = %score, "Funding recorded");

        let mut result = payload::single("status", json!("funding_recorded"));
        result.insert("event_id".into(), event_id);
        Ok(Some(result))
    }
}
