use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::info;
use uuid::Uuid;
use vigil_mesh::{AgentId, Payload};

use crate::agent::Agent;
use crate::context::AgentContext;
use crate::error::{AgentError, AgentResult};
use crate::payload::{self, AUDITOR, DISASTER_EVENT, WATCHTOWER};

/// Entry point of the pipeline: accepts raw disaster observations and
/// forwards them to the auditor.
#[derive(Debug, Clone, Default)]
pub struct WatchtowerAgent;

impl WatchtowerAgent {
    pub fn new() -> Self {
        Self
    }

    fn auditor() -> AgentResult<AgentId> {
        AgentId::parse(AUDITOR).map_err(|e| AgentError::Processing(e.to_string()))
    }
}

#[async_trait]
impl Agent for WatchtowerAgent {
    fn name(&self) -> &str {
        WATCHTOWER
    }

    async fn process_message(
        &self,
        payload: &Payload,
        ctx: &AgentContext,
    ) -> AgentResult<Option<Payload>> {
        let Some(event) = payload.get(DISASTER_EVENT) else {
            return Ok(None);
        };
        let Value::Object(event) = event else {
            return Err(AgentError::Processing(format!(
                "{DISASTER_EVENT} must be an object"
            )));
        };

        let mut event = event.clone();
        let event_id = match event.get("id").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => {
                let id = format!("evt-{}", Uuid::new_v4().simple());
                event.insert("id".into(), Value::String(id.clone()));
                id
            }
        };
        event
            .entry("detected_at")
            .or_insert_with(|| Value::String(chrono::Utc::now().to_rfc3339()));

        info!(event_id = %event_id, "Disaster event detected, forwarding to auditor");
        let delivered = ctx
            .forward(&Self::auditor()?, payload::single(DISASTER_EVENT, Value::Object(event)))
            .await;

        let status = if delivered { "forwarded" } else { "undelivered" };
        let mut result = payload::single("status", json!(status));
        result.insert("event_id".into(), Value::String(event_id));
        Ok(Some(result))
    }
}
