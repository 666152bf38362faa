//! Structured audit trail for material platform actions.
//!
//! Events: matching_run, allocation_expire, payout_create, campaign_create, campaign_fund,
//! campaign_status, pool_donate. Format: one JSON line with timestamp, actor, action,
//! resource, outcome. Sink: stdout or pluggable (e.g. test mock).

use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

/// Single audit record: one line of JSON per event.
#[derive(Clone, Debug, Serialize)]
pub struct AuditEvent {
    /// Unix timestamp (seconds since epoch).
    pub timestamp_secs: u64,
    /// Who performed the action (API key id or "anonymous").
    pub actor: String,
    pub action: String,
    /// Resource identifiers (e.g. campaign_id, center_id) or run counts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<serde_json::Value>,
    /// success, rejected, error.
    pub outcome: String,
}

/// Seconds since the Unix epoch, 0 if the clock is before it.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl AuditEvent {
    pub fn now(
        actor: impl Into<String>,
        action: impl Into<String>,
        resource: Option<serde_json::Value>,
        outcome: impl Into<String>,
    ) -> Self {
        Self {
            timestamp_secs: unix_now(),
            actor: actor.into(),
            action: action.into(),
            resource,
            outcome: outcome.into(),
        }
    }
}

/// Sink for audit events. Implementations write to stdout, file, or in-memory (tests).
pub trait AuditSink: Send + Sync {
    fn emit(&self, event: &AuditEvent);
}

/// Writes one JSON line per event to stdout.
pub struct StdoutAuditSink;

impl AuditSink for StdoutAuditSink {
    fn emit(&self, event: &AuditEvent) {
        if let Ok(line) = serde_json::to_string(event) {
            println!("{}", line);
        }
    }
}

/// In-memory sink that stores events for tests. Clone shares the same backing buffer.
#[derive(Clone, Default)]
pub struct InMemoryAuditSink {
    events: std::sync::Arc<std::sync::Mutex<Vec<AuditEvent>>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

impl AuditSink for InMemoryAuditSink {
    fn emit(&self, event: &AuditEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
