//! Built-in relay agents.
//!
//! The three agents form a pipeline: `watchtower` → `auditor` → `treasurer`.
//! Each one only reads and writes payloads; detection, verification and
//! funding backends are not modelled here.

pub mod auditor;
pub mod treasurer;
pub mod watchtower;

pub use auditor::{AuditorAgent, DEFAULT_VERIFICATION_THRESHOLD};
pub use treasurer::TreasurerAgent;
pub use watchtower::WatchtowerAgent;
