//! Simulated adapters
//!
//! Record every action instead of performing it. Used for dry-run mode
//! (`test-emergency`), degraded mode when a gateway is unreachable at
//! startup, and tests. Duplicate `(incident_id, step_seq)` pairs are no-ops,
//! matching the idempotency contract real adapters must honor.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

use companion_core::{AdapterError, ResponseEnvelope};
use companion_policy::ContactRung;

use crate::traits::{
    NotificationAdapter, NotifyChannel, PlaceOutcome, SmartHomeAdapter, TtsAdapter, VideoAdapter,
    VoiceCallAdapter,
};

/// Recording smart-home adapter with scriptable failures.
#[derive(Default)]
pub struct SimSmartHome {
    applied: Mutex<Vec<(String, String)>>,
    /// device -> remaining failures to inject
    fail_counts: Mutex<HashMap<String, (u32, AdapterError)>>,
    seen_steps: Mutex<HashSet<(Uuid, u64)>>,
}

impl SimSmartHome {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `times` commands against `device` fail with `error`.
    pub fn fail_device(&self, device: &str, times: u32, error: AdapterError) {
        self.fail_counts
            .lock()
            .insert(device.to_string(), (times, error));
    }

    pub fn applied(&self) -> Vec<(String, String)> {
        self.applied.lock().clone()
    }
}

#[async_trait]
impl SmartHomeAdapter for SimSmartHome {
    async fn apply(
        &self,
        device_id: &str,
        action: &str,
        params: &serde_json::Value,
        _deadline: Instant,
    ) -> Result<(), AdapterError> {
        // Idempotency: emergency scene commands carry (incident_id, step_seq)
        if let (Some(incident), Some(step)) = (
            params.get("incident_id").and_then(|v| v.as_str()),
            params.get("step_seq").and_then(|v| v.as_u64()),
        ) {
            if let Ok(incident) = incident.parse::<Uuid>() {
                if !self.seen_steps.lock().insert((incident, step)) {
                    return Ok(());
                }
            }
        }

        {
            let mut fails = self.fail_counts.lock();
            if let Some((remaining, error)) = fails.get_mut(device_id) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(error.clone());
                }
            }
        }

        self.applied
            .lock()
            .push((device_id.to_string(), action.to_string()));
        Ok(())
    }
}

/// Recording voice-call adapter.
pub struct SimVoiceCall {
    placed: Mutex<Vec<(String, Uuid, u64)>>,
    /// contact -> scripted outcomes, consumed front to back
    outcomes: Mutex<HashMap<String, Vec<Result<PlaceOutcome, AdapterError>>>>,
    seen_steps: Mutex<HashSet<(Uuid, u64)>>,
}

impl SimVoiceCall {
    pub fn new() -> Self {
        Self {
            placed: Mutex::new(Vec::new()),
            outcomes: Mutex::new(HashMap::new()),
            seen_steps: Mutex::new(HashSet::new()),
        }
    }

    /// Script placement outcomes for a contact; unscripted calls are accepted.
    pub fn script(&self, contact_id: &str, outcomes: Vec<Result<PlaceOutcome, AdapterError>>) {
        self.outcomes.lock().insert(contact_id.to_string(), outcomes);
    }

    pub fn placed(&self) -> Vec<(String, Uuid, u64)> {
        self.placed.lock().clone()
    }
}

impl Default for SimVoiceCall {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VoiceCallAdapter for SimVoiceCall {
    async fn place(
        &self,
        contact: &ContactRung,
        incident_id: Uuid,
        step_seq: u64,
        _deadline: Instant,
    ) -> Result<PlaceOutcome, AdapterError> {
        // A step that already placed is a no-op; a step whose earlier
        // attempt errored had no side effect, so it places normally
        if self.seen_steps.lock().contains(&(incident_id, step_seq)) {
            return Ok(PlaceOutcome::Accepted);
        }

        self.placed
            .lock()
            .push((contact.contact_id.clone(), incident_id, step_seq));

        let scripted = {
            let mut outcomes = self.outcomes.lock();
            outcomes
                .get_mut(&contact.contact_id)
                .and_then(|list| if list.is_empty() { None } else { Some(list.remove(0)) })
        };

        let result = scripted.unwrap_or(Ok(PlaceOutcome::Accepted));
        if result.is_ok() {
            self.seen_steps.lock().insert((incident_id, step_seq));
        }
        result
    }
}

/// Recording notification adapter.
#[derive(Default)]
pub struct SimNotification {
    sent: Mutex<Vec<(NotifyChannel, String, String)>>,
    fail_remaining: Mutex<u32>,
}

impl SimNotification {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `times` sends with a transient error.
    pub fn fail_next(&self, times: u32) {
        *self.fail_remaining.lock() = times;
    }

    pub fn sent(&self) -> Vec<(NotifyChannel, String, String)> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl NotificationAdapter for SimNotification {
    async fn send(
        &self,
        channel: NotifyChannel,
        recipient: &str,
        template_id: &str,
        _fields: &serde_json::Value,
        _deadline: Instant,
    ) -> Result<(), AdapterError> {
        {
            let mut remaining = self.fail_remaining.lock();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(AdapterError::Transient("gateway 503".to_string()));
            }
        }

        self.sent
            .lock()
            .push((channel, recipient.to_string(), template_id.to_string()));
        Ok(())
    }
}

/// Recording video adapter.
#[derive(Default)]
pub struct SimVideo {
    active: Mutex<HashSet<String>>,
}

impl SimVideo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self, stream_id: &str) -> bool {
        self.active.lock().contains(stream_id)
    }
}

#[async_trait]
impl VideoAdapter for SimVideo {
    async fn activate(
        &self,
        stream_id: &str,
        _cameras: &[String],
        _access_token: &str,
    ) -> Result<(), AdapterError> {
        self.active.lock().insert(stream_id.to_string());
        Ok(())
    }

    async fn deactivate(&self, stream_id: &str) -> Result<(), AdapterError> {
        self.active.lock().remove(stream_id);
        Ok(())
    }
}

/// Recording TTS adapter.
#[derive(Default)]
pub struct SimTts {
    spoken: Mutex<Vec<ResponseEnvelope>>,
}

impl SimTts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spoken(&self) -> Vec<ResponseEnvelope> {
        self.spoken.lock().clone()
    }
}

#[async_trait]
impl TtsAdapter for SimTts {
    async fn speak(&self, envelope: &ResponseEnvelope) -> Result<(), AdapterError> {
        self.spoken.lock().push(envelope.clone());
        Ok(())
    }
}
