//! Well-known agent names and payload keys.
//!
//! Every inter-agent payload has a single top-level key naming its type.

use serde_json::Value;
use vigil_mesh::Payload;

pub const WATCHTOWER: &str = "watchtower";
pub const AUDITOR: &str = "auditor";
pub const TREASURER: &str = "treasurer";
/// Queue consumed by the orchestrator itself
pub const ORCHESTRATOR: &str = "orchestrator";

/// Observation of a possible disaster, consumed by the auditor
pub const DISASTER_EVENT: &str = "disaster_event";
/// Event that passed verification, consumed by the treasurer
pub const VERIFIED_EVENT: &str = "verified_event";
/// Control message asking the orchestrator to shut down
pub const SHUTDOWN: &str = "shutdown";

/// Build a payload with a single top-level key
pub fn single(key: &str, value: Value) -> Payload {
    let mut payload = Payload::new();
    payload.insert(key.to_string(), value);
    payload
}

/// The object stored under `key`, if the payload has one
pub fn object<'a>(payload: &'a Payload, key: &str) -> Option<&'a serde_json::Map<String, Value>> {
    payload.get(key).and_then(Value::as_object)
}
