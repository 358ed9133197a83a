//! Audit record types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// What a component reports; the sink adds sequence, time and hash.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub session_id: String,
    pub utterance_id: Option<u64>,
    pub incident_id: Option<Uuid>,
    /// Pipeline stage, e.g. "rules", "post_guard", "adapter", "incident"
    pub stage: &'static str,
    /// Outcome code, e.g. "emergency", "deny", "confirm_timeout"
    pub outcome: String,
    /// Stage-specific detail
    pub payload: serde_json::Value,
}

impl AuditEvent {
    pub fn new(session_id: impl Into<String>, stage: &'static str, outcome: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            utterance_id: None,
            incident_id: None,
            stage,
            outcome: outcome.into(),
            payload: serde_json::Value::Null,
        }
    }

    pub fn utterance(mut self, id: u64) -> Self {
        self.utterance_id = Some(id);
        self
    }

    pub fn incident(mut self, id: Uuid) -> Self {
        self.incident_id = Some(id);
        self
    }

    pub fn payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Sequence scope: records within one incident are strictly ordered;
    /// everything else orders per session.
    pub(crate) fn scope(&self) -> String {
        match self.incident_id {
            Some(id) => format!("incident:{}", id),
            None => format!("session:{}", self.session_id),
        }
    }
}

/// One appended decision-log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Strictly increasing within the scope, no gaps
    pub seq: u64,
    pub t: DateTime<Utc>,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utterance_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incident_id: Option<Uuid>,
    pub stage: String,
    pub outcome: String,
    pub payload_hash: String,
    pub payload: serde_json::Value,
}

impl AuditRecord {
    pub(crate) fn from_event(event: AuditEvent, seq: u64) -> Self {
        let payload_hash = hash_payload(&event.payload);
        Self {
            seq,
            t: Utc::now(),
            session_id: event.session_id,
            utterance_id: event.utterance_id,
            incident_id: event.incident_id,
            stage: event.stage.to_string(),
            outcome: event.outcome,
            payload_hash,
            payload: event.payload,
        }
    }
}

fn hash_payload(payload: &serde_json::Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}
