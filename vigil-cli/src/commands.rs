//! Command implementations

use serde_json::{Value, json};
use std::path::PathBuf;
use std::time::SystemTime;
use thiserror::Error;
use tracing::{info, warn};
use vigil_agent::payload::{self, ORCHESTRATOR, SHUTDOWN};
use vigil_mesh::{AgentId, Delivery, IdValidationError, MessageQueue, Payload};
use vigil_orchestrator::{
    ConfigError, Orchestrator, OrchestratorError, SystemConfig, cancel_on_signal,
};

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),

    #[error("Invalid agent name '{name}': {source}")]
    InvalidAgent {
        name: String,
        #[source]
        source: IdValidationError,
    },

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Message {0} could not be enqueued")]
    NotDelivered(String),

    #[error("Failed to encode status: {0}")]
    Output(#[from] serde_json::Error),
}

fn agent_id(name: &str) -> Result<AgentId, CliError> {
    AgentId::parse(name).map_err(|source| CliError::InvalidAgent {
        name: name.to_string(),
        source,
    })
}

fn rfc3339(at: chrono::DateTime<chrono::Utc>) -> String {
    humantime::format_rfc3339_seconds(SystemTime::from(at)).to_string()
}

pub fn load_config(path: Option<PathBuf>) -> Result<SystemConfig, CliError> {
    let path = path.unwrap_or_else(SystemConfig::default_path);
    Ok(SystemConfig::load(path)?)
}

async fn connect(config: &SystemConfig) -> MessageQueue {
    MessageQueue::connect(config.redis_config(), config.queue_config()).await
}

/// Parse a JSON object given on the command line
pub fn parse_payload(raw: &str) -> Result<Payload, CliError> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(CliError::InvalidPayload(format!(
            "expected a JSON object, got {other}"
        ))),
        Err(e) => Err(CliError::InvalidPayload(e.to_string())),
    }
}

pub async fn start(config: SystemConfig) -> Result<(), CliError> {
    let monitoring = &config.monitoring;
    info!(
        agents = config.enabled_agents().count(),
        heartbeat_timeout = %humantime::format_duration(monitoring.heartbeat_timeout()),
        health_check_interval = %humantime::format_duration(monitoring.health_check_interval()),
        max_restarts = monitoring.max_restarts,
        "Starting Vigil"
    );

    let mut orchestrator = Orchestrator::connect(config).await;
    let signals = cancel_on_signal(orchestrator.shutdown_token());
    let result = orchestrator.run().await;
    signals.abort();
    result.map_err(CliError::from)
}

pub async fn stop(config: SystemConfig) -> Result<(), CliError> {
    let queue = connect(&config).await;
    if queue.is_degraded() {
        warn!("No shared broker reachable; a running orchestrator will not see this request");
    }

    let request = payload::single(SHUTDOWN, json!({ "requested_at": rfc3339(chrono::Utc::now()) }));
    let delivery = queue
        .publish(&agent_id("cli")?, &agent_id(ORCHESTRATOR)?, request)
        .await;
    queue.disconnect().await;

    match delivery {
        Delivery::Enqueued(id) => {
            println!("Shutdown requested (message {id})");
            Ok(())
        }
        Delivery::DeadLettered(id) => Err(CliError::NotDelivered(id.to_string())),
    }
}

pub async fn status(config: SystemConfig, as_json: bool) -> Result<(), CliError> {
    let queue = connect(&config).await;
    let health = queue.health_check().await;
    let stats = queue.get_all_queue_stats().await;
    queue.disconnect().await;

    if as_json {
        let report = json!({
            "backend_health": health,
            "degraded": queue.is_degraded(),
            "queue_stats": stats,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "Backend: {} ({}){}",
        health.backend,
        health.status.as_str(),
        if queue.is_degraded() { " [fallback]" } else { "" }
    );
    if let vigil_mesh::HealthStatus::Unhealthy { error } = &health.status {
        println!("  error: {error}");
    }
    println!("Checked at: {}", rfc3339(health.timestamp));
    println!();

    if stats.is_empty() {
        println!("No queued messages.");
        return Ok(());
    }
    println!("{:<20} {:>10} {:>10}", "AGENT", "QUEUED", "DLQ");
    for (agent, stat) in &stats {
        println!("{:<20} {:>10} {:>10}", agent, stat.queue_size, stat.dlq_size);
    }
    Ok(())
}

pub async fn inject(
    config: SystemConfig,
    sender: &str,
    recipient: &str,
    raw_payload: &str,
) -> Result<(), CliError> {
    let sender = agent_id(sender)?;
    let recipient = agent_id(recipient)?;
    let payload = parse_payload(raw_payload)?;

    let queue = connect(&config).await;
    let delivery = queue.publish(&sender, &recipient, payload).await;
    queue.disconnect().await;

    match delivery {
        Delivery::Enqueued(id) => println!("Injected message {id} into {recipient}"),
        Delivery::DeadLettered(id) => {
            println!("Message {id} could not be enqueued and was dead-lettered")
        }
    }
    Ok(())
}

pub async fn clear(config: SystemConfig) -> Result<(), CliError> {
    let queue = connect(&config).await;
    for name in config.agents.keys() {
        let agent = agent_id(name)?;
        let waiting = queue.get_queue_size(&agent).await;
        match queue.clear_queue(&agent).await {
            Ok(()) => println!("Cleared {agent} ({waiting} messages)"),
            Err(e) => println!("Failed to clear {agent}: {e}"),
        }
    }
    queue.disconnect().await;
    Ok(())
}
