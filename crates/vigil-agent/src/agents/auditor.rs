use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tracing::info;
use vigil_mesh::{AgentId, Payload};

use crate::agent::Agent;
use crate::context::AgentContext;
use crate::error::{AgentError, AgentResult};
use crate::payload::{self, AUDITOR, DISASTER_EVENT, TREASURER, VERIFIED_EVENT};
use crate::registry::AgentOptions;

/// Minimum score an event needs to be passed on for funding
pub const DEFAULT_VERIFICATION_THRESHOLD: f64 = 0.7;

/// Verifies disaster events and forwards the ones that pass to the treasurer.
///
/// An event's score is the mean of its `confidence` and `severity`, both in
/// `0.0..=1.0`.
#[derive(Debug, Clone)]
pub struct AuditorAgent {
    verification_threshold: f64,
}

impl Default for AuditorAgent {
    fn default() -> Self {
        Self {
            verification_threshold: DEFAULT_VERIFICATION_THRESHOLD,
        }
    }
}

impl AuditorAgent {
    pub fn new(verification_threshold: f64) -> AgentResult<Self> {
        if !(0.0..=1.0).contains(&verification_threshold) {
            return Err(AgentError::Configuration {
                agent: AUDITOR.to_string(),
                reason: format!(
                    "verification_threshold must be between 0 and 1, got {verification_threshold}"
                ),
            });
        }
        Ok(Self {
            verification_threshold,
        })
    }

    /// Build from configuration, reading `verification_threshold`
    pub fn from_options(options: &AgentOptions) -> AgentResult<Self> {
        match options.get("verification_threshold") {
            None => Ok(Self::default()),
            Some(value) => {
                let threshold = value.as_f64().ok_or_else(|| AgentError::Configuration {
                    agent: AUDITOR.to_string(),
                    reason: "verification_threshold must be a number".to_string(),
                })?;
                Self::new(threshold)
            }
        }
    }

    pub fn verification_threshold(&self) -> f64 {
        self.verification_threshold
    }

    /// Score an event, rejecting missing or out-of-range inputs
    pub fn score(event: &Map<String, Value>) -> AgentResult<f64> {
        let confidence = unit_field(event, "confidence")?;
        let severity = unit_field(event, "severity")?;
        Ok((confidence + severity) / 2.0)
    }
}

fn unit_field(event: &Map<String, Value>, field: &str) -> AgentResult<f64> {
    let value = event
        .get(field)
        .and_then(Value::as_f64)
        .ok_or_else(|| AgentError::Processing(format!("event has no numeric '{field}'")))?;
    if !(0.0..=1.0).contains(&value) {
        return Err(AgentError::Processing(format!(
            "'{field}' must be between 0 and 1, got {value}"
        )));
    }
    Ok(value)
}

#[async_trait]
impl Agent for AuditorAgent {
    fn name(&self) -> &str {
        AUDITOR
    }

    async fn process_message(
        &self,
        payload: &Payload,
        ctx: &AgentContext,
    ) -> AgentResult<Option<Payload>> {
        if !payload.contains_key(DISASTER_EVENT) {
            return Ok(None);
        }
        let event = payload::object(payload, DISASTER_EVENT).ok_or_else(|| {
            AgentError::Processing(format!("{DISASTER_EVENT} must be an object"))
        })?;

        let score = Self::score(event)?;
        let event_id = event.get("id").cloned().unwrap_or(Value::Null);

        if score < self.verification_threshold {
            info!(
                event_id = %event_id,
                score,
                threshold = self.verification_threshold,
                "Disaster event rejected"
            );
            return Ok(Some(status("rejected", event_id, score)));
        }

        let mut verified = event.clone();
        verified.insert("verification_score".into(), json!(score));
        let treasurer =
            AgentId::parse(TREASURER).map_err(|e| AgentError::Processing(e.to_string()))?;
        let forwarded = ctx
            .forward(
                &treasurer,
                payload::single(VERIFIED_EVENT, Value::Object(verified)),
            )
            .await;

        info!(event_id = %event_id, score, forwarded, "Disaster event verified");
        let mut result = status("verified", event_id, score);
        result.insert("forwarded".into(), json!(forwarded));
        Ok(Some(result))
    }
}

fn status(status: &str, event_id: Value, score: f64) -> Payload {
    let mut result = payload::single("status", json!(status));
    result.insert("event_id".into(), event_id);
    result.insert("verification_score".into(), json!(score));
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use vigil_mesh::{MessageQueue, QueueConfig};

    fn setup() -> (Arc<MessageQueue>, AgentContext) {
        let queue = Arc::new(MessageQueue::in_memory(QueueConfig::default()));
        let ctx = AgentContext::new(AgentId::parse(AUDITOR).unwrap(), Some(queue.clone()));
        (queue, ctx)
    }

    fn treasurer() -> AgentId {
        AgentId::parse(TREASURER).unwrap()
    }

    #[tokio::test]
    async fn test_verified_event_goes_to_treasurer() {
        let (queue, ctx) = setup();
        let input = payload::single(
            DISASTER_EVENT,
            json!({"id": "evt-1", "confidence": 0.9, "severity": 0.8}),
        );

        let result = AuditorAgent::default()
            .process_message(&input, &ctx)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result["status"], "verified");
        assert_eq!(result["event_id"], "evt-1");
        assert_eq!(result["forwarded"], true);

        let forwarded = queue.consume(&treasurer()).await.unwrap();
        assert_eq!(forwarded.sender, AgentId::parse(AUDITOR).unwrap());
        let event = payload::object(&forwarded.payload, VERIFIED_EVENT).unwrap();
        assert_eq!(event["id"], "evt-1");
        let score = event["verification_score"].as_f64().unwrap();
        assert!((score - 0.85).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_verified_without_queue_is_not_forwarded() {
        let ctx = AgentContext::new(AgentId::parse(AUDITOR).unwrap(), None);
        let input = payload::single(
            DISASTER_EVENT,
            json!({"id": "evt-3", "confidence": 1.0, "severity": 1.0}),
        );

        let result = AuditorAgent::default()
            .process_message(&input, &ctx)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result["status"], "verified");
        assert_eq!(result["forwarded"], false);
    }

    #[tokio::test]
    async fn test_low_score_is_rejected() {
        let (queue, ctx) = setup();
        let input = payload::single(
            DISASTER_EVENT,
            json!({"id": "evt-2", "confidence": 0.3, "severity": 0.4}),
        );

        let result = AuditorAgent::default()
            .process_message(&input, &ctx)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result["status"], "rejected");
        assert_eq!(queue.get_queue_size(&treasurer()).await, 0);
    }

    #[tokio::test]
    async fn test_threshold_from_options() {
        let (queue, ctx) = setup();
        let mut options = AgentOptions::new();
        options.insert("verification_threshold".into(), json!(0.3));
        let auditor = AuditorAgent::from_options(&options).unwrap();
        assert_eq!(auditor.verification_threshold(), 0.3);

        let input = payload::single(DISASTER_EVENT, json!({"confidence": 0.3, "severity": 0.4}));
        let result = auditor.process_message(&input, &ctx).await.unwrap().unwrap();
        assert_eq!(result["status"], "verified");
        assert_eq!(queue.get_queue_size(&treasurer()).await, 1);
    }

    #[tokio::test]
    async fn test_missing_fields_are_processing_errors() {
        let (_queue, ctx) = setup();
        let input = payload::single(DISASTER_EVENT, json!({"confidence": 0.9}));
        let err = AuditorAgent::default()
            .process_message(&input, &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Processing(_)));

        let input = payload::single(DISASTER_EVENT, json!({"confidence": 1.5, "severity": 0.5}));
        assert!(
            AuditorAgent::default()
                .process_message(&input, &ctx)
                .await
                .is_err()
        );
    }

    #[test]
    fn test_invalid_threshold_option() {
        let mut options = AgentOptions::new();
        options.insert("verification_threshold".into(), json!("high"));
        assert!(matches!(
            AuditorAgent::from_options(&options),
            Err(AgentError::Configuration { .. })
        ));
    }
}
