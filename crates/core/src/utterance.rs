//! Utterance types as delivered by the ASR collaborator

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Supported utterance languages
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// Mandarin Chinese
    Zh,
    /// English
    En,
    /// Cantonese
    Yue,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Zh => "zh",
            Self::En => "en",
            Self::Yue => "yue",
        }
    }
}

impl Default for Language {
    fn default() -> Self {
        Self::Zh
    }
}

/// One final ASR result. Read-only after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Utterance {
    /// Monotonically increasing per session
    pub id: u64,
    /// Session this utterance belongs to
    pub session_id: String,
    /// Decoded text
    pub text: String,
    /// Detected language
    pub language: Language,
    /// ASR confidence in [0, 1]
    pub asr_conf: f32,
    /// Arrival timestamp
    pub t_arrival: DateTime<Utc>,
    /// Optional speaker profile reference
    pub speaker_profile_id: Option<String>,
}

impl Utterance {
    /// Build an utterance from the wire event, assigning it to a session.
    pub fn from_event(event: AudioInEvent, session_id: impl Into<String>) -> Self {
        let t_arrival = Utc
            .timestamp_millis_opt(event.t_arrival_ms)
            .single()
            .unwrap_or_else(Utc::now);

        Self {
            id: event.utterance_id,
            session_id: session_id.into(),
            text: event.text,
            language: event.language,
            asr_conf: event.asr_conf.clamp(0.0, 1.0),
            t_arrival,
            speaker_profile_id: event.speaker_profile_id,
        }
    }
}

/// Audio-in event as posted by the ASR collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioInEvent {
    pub utterance_id: u64,
    pub text: String,
    #[serde(default)]
    pub language: Language,
    pub asr_conf: f32,
    pub t_arrival_ms: i64,
    #[serde(default)]
    pub speaker_profile_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_roundtrip() {
        let json = serde_json::to_string(&Language::Yue).unwrap();
        assert_eq!(json, "\"yue\"");
        let back: Language = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Language::Yue);
    }

    #[test]
    fn test_from_event_clamps_confidence() {
        let event = AudioInEvent {
            utterance_id: 1,
            text: "你好".to_string(),
            language: Language::Zh,
            asr_conf: 1.4,
            t_arrival_ms: 1_700_000_000_000,
            speaker_profile_id: None,
        };

        let utterance = Utterance::from_event(event, "session-1");
        assert_eq!(utterance.asr_conf, 1.0);
        assert_eq!(utterance.session_id, "session-1");
    }
}
