//! Adapter capability traits
//!
//! One fixed capability surface per adapter kind. Implementations must treat
//! a repeated `(incident_id, step_seq)` pair as a no-op; the emergency path
//! relies on that for replay safety.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

use companion_core::{AdapterError, ResponseEnvelope};
use companion_policy::ContactRung;

/// Smart-home effector (lights, locks, HVAC).
#[async_trait]
pub trait SmartHomeAdapter: Send + Sync {
    async fn apply(
        &self,
        device_id: &str,
        action: &str,
        params: &serde_json::Value,
        deadline: Instant,
    ) -> Result<(), AdapterError>;
}

/// Result of placing a call. `Busy`/`Failed` advance the escalation ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceOutcome {
    Accepted,
    Busy,
    Failed,
}

/// Outbound calling via the SIP gateway.
#[async_trait]
pub trait VoiceCallAdapter: Send + Sync {
    async fn place(
        &self,
        contact: &ContactRung,
        incident_id: Uuid,
        step_seq: u64,
        deadline: Instant,
    ) -> Result<PlaceOutcome, AdapterError>;
}

/// Callee acknowledgement, delivered out-of-band (DTMF key, API callback or
/// a human operator token).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallAck {
    pub incident_id: Uuid,
    pub contact_id: String,
    pub status: AckStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckStatus {
    /// Callee confirmed they are handling the emergency
    Reached,
    /// Callee declined or the call went to voicemail
    NotReached,
}

/// Notification channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyChannel {
    Sms,
    Email,
}

impl NotifyChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sms => "sms",
            Self::Email => "email",
        }
    }
}

/// SMS / email notifications.
#[async_trait]
pub trait NotificationAdapter: Send + Sync {
    async fn send(
        &self,
        channel: NotifyChannel,
        recipient: &str,
        template_id: &str,
        fields: &serde_json::Value,
        deadline: Instant,
    ) -> Result<(), AdapterError>;
}

/// Emergency video uplink control.
#[async_trait]
pub trait VideoAdapter: Send + Sync {
    async fn activate(
        &self,
        stream_id: &str,
        cameras: &[String],
        access_token: &str,
    ) -> Result<(), AdapterError>;

    async fn deactivate(&self, stream_id: &str) -> Result<(), AdapterError>;
}

/// TTS playback of a response envelope.
#[async_trait]
pub trait TtsAdapter: Send + Sync {
    async fn speak(&self, envelope: &ResponseEnvelope) -> Result<(), AdapterError>;
}
