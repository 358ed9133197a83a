//! Response envelope consumed by the TTS collaborator

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::utterance::Language;

/// TTS delivery urgency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Normal,
    Calming,
    Urgent,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Calming => "calming",
            Self::Urgent => "urgent",
        }
    }
}

/// Structured outcome of one utterance, alongside the spoken text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// Side effects completed
    Completed,
    /// Emergency accepted; fan-out continues independently
    EmergencyAccepted { incident_id: Uuid },
    /// High-risk action held for a second utterance
    NeedsConfirmation,
    /// Guard denial, no side effect
    Denied { reason: String },
    /// Adapter queue overflow, try again
    Busy,
    /// Side effect attempted and failed
    Failed { reason: String },
    /// Conversational reply only
    Chat,
    /// Utterance dropped before any stage
    Rejected { reason: String },
}

/// What the user hears, plus the structured result for other consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub response_text: String,
    pub locale: Language,
    pub urgency: Urgency,
    pub allow_interrupt: bool,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl ResponseEnvelope {
    pub fn new(text: impl Into<String>, locale: Language, urgency: Urgency, outcome: Outcome) -> Self {
        Self {
            response_text: text.into(),
            locale,
            urgency,
            // Emergency acknowledgements must not be barged over
            allow_interrupt: !matches!(urgency, Urgency::Urgent),
            outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urgent_blocks_interrupt() {
        let envelope = ResponseEnvelope::new(
            "已为您联系家人",
            Language::Zh,
            Urgency::Urgent,
            Outcome::EmergencyAccepted {
                incident_id: Uuid::new_v4(),
            },
        );
        assert!(!envelope.allow_interrupt);
    }

    #[test]
    fn test_envelope_serde_flattens_outcome() {
        let envelope = ResponseEnvelope::new(
            "好的",
            Language::Zh,
            Urgency::Normal,
            Outcome::Completed,
        );
        let json = serde_json::to_string(&envelope).unwrap();
        assert!(json.contains("\"outcome\":\"completed\""));
    }
}
