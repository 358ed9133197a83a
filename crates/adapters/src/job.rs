//! Adapter jobs

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

use companion_core::ResponseEnvelope;
use companion_policy::ContactRung;

use crate::traits::PlaceOutcome;

/// Adapter kinds with their own queues and concurrency caps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterKind {
    SmartHome,
    Calling,
    Notify,
    Tts,
    Video,
}

impl AdapterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SmartHome => "smart_home",
            Self::Calling => "calling",
            Self::Notify => "notify",
            Self::Tts => "tts",
            Self::Video => "video",
        }
    }
}

/// Terminal result of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// Side effect completed
    Completed,
    /// Placement result from the SIP gateway; `Busy`/`Failed` are terminal
    /// answers, not transport errors, so they are never retried
    CallPlaced(PlaceOutcome),
}

/// Dispatch lane. Emergency jobs preempt queue position and are never
/// dropped on backpressure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lane {
    Normal,
    Emergency,
}

/// Payload per adapter kind.
#[derive(Debug, Clone)]
pub enum JobPayload {
    SmartHome {
        device: String,
        action: String,
        params: serde_json::Value,
    },
    Calling {
        contact: ContactRung,
        incident_id: Uuid,
        step_seq: u64,
    },
    Notify {
        channel: crate::NotifyChannel,
        recipient: String,
        template_id: String,
        fields: serde_json::Value,
    },
    Tts {
        session_id: String,
        envelope: ResponseEnvelope,
    },
    Video {
        session_id: String,
        activate: bool,
        stream_id: String,
        cameras: Vec<String>,
        access_token: String,
    },
}

impl JobPayload {
    pub fn kind(&self) -> AdapterKind {
        match self {
            Self::SmartHome { .. } => AdapterKind::SmartHome,
            Self::Calling { .. } => AdapterKind::Calling,
            Self::Notify { .. } => AdapterKind::Notify,
            Self::Tts { .. } => AdapterKind::Tts,
            Self::Video { .. } => AdapterKind::Video,
        }
    }

    /// Serialization key: jobs sharing a key run one at a time. Smart-home
    /// serializes per device to prevent conflicting state; calling per
    /// incident (one outbound call at a time per incident); TTS and video
    /// per session.
    pub fn serial_key(&self) -> String {
        match self {
            Self::SmartHome { device, .. } => format!("device:{}", device),
            Self::Calling { incident_id, .. } => format!("call:{}", incident_id),
            Self::Notify { recipient, .. } => format!("notify:{}", recipient),
            Self::Tts { session_id, .. } => format!("tts:{}", session_id),
            Self::Video { session_id, .. } => format!("video:{}", session_id),
        }
    }
}

/// One side-effect request.
#[derive(Debug)]
pub struct AdapterJob {
    pub id: Uuid,
    pub payload: JobPayload,
    pub attempts: u32,
    /// Inherited from the orchestrator's stage budget
    pub deadline: Instant,
    pub lane: Lane,
}

impl AdapterJob {
    pub fn new(payload: JobPayload, deadline: Instant) -> Self {
        Self {
            id: Uuid::new_v4(),
            payload,
            attempts: 0,
            deadline,
            lane: Lane::Normal,
        }
    }

    pub fn emergency(payload: JobPayload, deadline: Instant) -> Self {
        Self {
            lane: Lane::Emergency,
            ..Self::new(payload, deadline)
        }
    }

    pub fn kind(&self) -> AdapterKind {
        self.payload.kind()
    }
}
