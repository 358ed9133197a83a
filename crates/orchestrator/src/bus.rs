//! Typed in-process event bus
//!
//! One broadcast channel per topic. Delivery is at-least-once within the
//! process; ordering holds per (topic, incident), not across topics. Slow
//! subscribers lag and miss, they never block publishers.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use companion_audit::AuditRecord;
use companion_core::{GuardVerdict, Intent, Utterance};
use companion_emergency::IncidentEvent;

/// `guard.verdict` payload.
#[derive(Debug, Clone, Serialize)]
pub struct GuardVerdictEvent {
    pub session_id: String,
    pub utterance_id: u64,
    /// "pre" or "post"
    pub stage: &'static str,
    pub verdict: GuardVerdict,
}

/// `intent.resolved` payload. Consumed by the motion stack for validated
/// assist.move intents.
#[derive(Debug, Clone, Serialize)]
pub struct IntentResolvedEvent {
    pub session_id: String,
    pub utterance_id: u64,
    pub intent: Intent,
}

/// `adapter.result` payload.
#[derive(Debug, Clone, Serialize)]
pub struct AdapterResultEvent {
    pub session_id: String,
    pub utterance_id: Option<u64>,
    pub job_id: Uuid,
    pub kind: &'static str,
    pub outcome: String,
}

const TOPIC_CAPACITY: usize = 256;

/// The internal publish/subscribe fabric.
pub struct Bus {
    utterances: broadcast::Sender<Arc<Utterance>>,
    verdicts: broadcast::Sender<GuardVerdictEvent>,
    intents: broadcast::Sender<IntentResolvedEvent>,
    adapter_results: broadcast::Sender<AdapterResultEvent>,
    incidents: broadcast::Sender<IncidentEvent>,
    audit_records: broadcast::Sender<AuditRecord>,
}

impl Bus {
    pub fn new() -> Self {
        Self {
            utterances: broadcast::channel(TOPIC_CAPACITY).0,
            verdicts: broadcast::channel(TOPIC_CAPACITY).0,
            intents: broadcast::channel(TOPIC_CAPACITY).0,
            adapter_results: broadcast::channel(TOPIC_CAPACITY).0,
            incidents: broadcast::channel(TOPIC_CAPACITY).0,
            audit_records: broadcast::channel(TOPIC_CAPACITY).0,
        }
    }

    pub fn publish_utterance(&self, utterance: Arc<Utterance>) {
        let _ = self.utterances.send(utterance);
    }

    pub fn publish_verdict(&self, event: GuardVerdictEvent) {
        let _ = self.verdicts.send(event);
    }

    pub fn publish_intent(&self, event: IntentResolvedEvent) {
        let _ = self.intents.send(event);
    }

    pub fn publish_adapter_result(&self, event: AdapterResultEvent) {
        let _ = self.adapter_results.send(event);
    }

    pub fn publish_incident(&self, event: IncidentEvent) {
        let _ = self.incidents.send(event);
    }

    pub fn publish_audit(&self, record: AuditRecord) {
        let _ = self.audit_records.send(record);
    }

    pub fn subscribe_utterances(&self) -> broadcast::Receiver<Arc<Utterance>> {
        self.utterances.subscribe()
    }

    pub fn subscribe_verdicts(&self) -> broadcast::Receiver<GuardVerdictEvent> {
        self.verdicts.subscribe()
    }

    pub fn subscribe_intents(&self) -> broadcast::Receiver<IntentResolvedEvent> {
        self.intents.subscribe()
    }

    pub fn subscribe_adapter_results(&self) -> broadcast::Receiver<AdapterResultEvent> {
        self.adapter_results.subscribe()
    }

    pub fn subscribe_incidents(&self) -> broadcast::Receiver<IncidentEvent> {
        self.incidents.subscribe()
    }

    pub fn subscribe_audit(&self) -> broadcast::Receiver<AuditRecord> {
        self.audit_records.subscribe()
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}
