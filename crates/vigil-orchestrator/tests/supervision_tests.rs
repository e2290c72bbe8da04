//! End-to-end supervision tests using the built-in agents and the
//! in-memory queue backend.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use vigil_agent::AgentRegistry;
use vigil_agent::payload::{self, DISASTER_EVENT, ORCHESTRATOR, SHUTDOWN, WATCHTOWER};
use vigil_mesh::{AgentId, MessageQueue, QueueConfig};
use vigil_orchestrator::{AgentState, Orchestrator, OrchestratorState, SystemConfig};

fn id(name: &str) -> AgentId {
    AgentId::parse(name).unwrap()
}

fn queue() -> Arc<MessageQueue> {
    Arc::new(MessageQueue::in_memory(QueueConfig {
        consume_timeout: Duration::from_millis(100),
        ..QueueConfig::default()
    }))
}

#[tokio::test(start_paused = true)]
async fn test_event_flows_through_pipeline() {
    let queue = queue();
    let mut orch = Orchestrator::new(
        SystemConfig::default(),
        AgentRegistry::with_builtin_agents(),
        Arc::clone(&queue),
    );
    orch.start_agents().unwrap();

    queue
        .publish(
            &id("cli"),
            &id(WATCHTOWER),
            payload::single(
                DISASTER_EVENT,
                json!({"id": "evt-42", "confidence": 0.9, "severity": 0.9}),
            ),
        )
        .await;

    // Give the three agents time to relay the event.
    tokio::time::sleep(Duration::from_secs(3)).await;
    orch.check_agent_health().await;

    let status = orch.system_status().await;
    assert_eq!(status.total_agents, 3);
    assert_eq!(status.running_agents, 3);
    for name in ["watchtower", "auditor", "treasurer"] {
        let agent = &status.agents[&id(name)];
        assert_eq!(agent.processed_count, 1, "{name} should have handled one message");
        assert_eq!(agent.error_count, 0);
    }
    assert!(status.queue_stats.values().all(|s| s.queue_size == 0));
    assert!(status.backend_health.is_healthy());

    orch.shutdown().await;
    assert_eq!(orch.state(), OrchestratorState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_control_queue_shutdown() {
    let queue = queue();
    let mut orch = Orchestrator::new(
        SystemConfig::default(),
        AgentRegistry::with_builtin_agents(),
        Arc::clone(&queue),
    );

    let stopper = {
        let queue = Arc::clone(&queue);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            queue
                .publish(
                    &id("cli"),
                    &id(ORCHESTRATOR),
                    payload::single(SHUTDOWN, json!({"requested_by": "test"})),
                )
                .await;
        })
    };

    orch.run().await.unwrap();
    stopper.await.unwrap();

    assert_eq!(orch.state(), OrchestratorState::Stopped);
    let status = orch.agent_status(&id("auditor")).unwrap();
    assert_eq!(status.status, AgentState::Stopped);
    assert_eq!(status.restart_count, 0);
}

#[tokio::test(start_paused = true)]
async fn test_disabled_agents_are_not_started() {
    let mut config = SystemConfig::default();
    if let Some(treasurer) = config.agents.get_mut("treasurer") {
        treasurer.enabled = false;
    }
    let mut orch = Orchestrator::new(config, AgentRegistry::with_builtin_agents(), queue());
    orch.start_agents().unwrap();

    assert!(orch.agent_status(&id("treasurer")).is_none());
    assert_eq!(orch.system_status().await.total_agents, 2);
    orch.shutdown().await;
}
