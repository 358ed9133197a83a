//! Typed action requests
//!
//! Intents are a closed sum: every action that can reach an adapter is one of
//! these shapes. No free-form dictionaries cross component boundaries.

use serde::{Deserialize, Serialize};

/// A typed, schema-valid action request.
///
/// Produced either directly by the rules engine or by the LLM intent client
/// after strict-schema validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "intent")]
pub enum Intent {
    /// Smart-home device command
    #[serde(rename = "smart.home")]
    SmartHome {
        device: String,
        action: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room: Option<String>,
        #[serde(default)]
        confirm: bool,
    },
    /// Quadruped motion request
    #[serde(rename = "assist.move")]
    AssistMove {
        target: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        speed: Option<String>,
        #[serde(default)]
        confirm: bool,
    },
    /// Outbound call request
    #[serde(rename = "call.emergency")]
    CallEmergency {
        callee: String,
        reason: String,
        #[serde(default = "default_true")]
        confirm: bool,
    },
    /// Conversational turn with no side effect
    #[serde(rename = "chat")]
    Chat {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        style: Option<String>,
    },
}

fn default_true() -> bool {
    true
}

impl Intent {
    /// Stable kind tag, used for rate-limit keys and audit records.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SmartHome { .. } => "smart.home",
            Self::AssistMove { .. } => "assist.move",
            Self::CallEmergency { .. } => "call.emergency",
            Self::Chat { .. } => "chat",
        }
    }

    /// Whether this intent requests an explicit confirmation step.
    pub fn wants_confirm(&self) -> bool {
        match self {
            Self::SmartHome { confirm, .. } => *confirm,
            Self::AssistMove { confirm, .. } => *confirm,
            Self::CallEmergency { confirm, .. } => *confirm,
            Self::Chat { .. } => false,
        }
    }

    /// Device targeted by this intent, if any.
    pub fn device(&self) -> Option<&str> {
        match self {
            Self::SmartHome { device, .. } => Some(device),
            _ => None,
        }
    }

    /// Action requested of the device, if any.
    pub fn action(&self) -> Option<&str> {
        match self {
            Self::SmartHome { action, .. } => Some(action),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smart_home_tag() {
        let intent = Intent::SmartHome {
            device: "living_room_light".to_string(),
            action: "brighten".to_string(),
            room: Some("living_room".to_string()),
            confirm: false,
        };

        let json = serde_json::to_string(&intent).unwrap();
        assert!(json.contains("\"intent\":\"smart.home\""));

        let back: Intent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, intent);
        assert_eq!(back.kind(), "smart.home");
    }

    #[test]
    fn test_call_emergency_defaults_confirm() {
        let json = r#"{"intent":"call.emergency","callee":"family","reason":"fall"}"#;
        let intent: Intent = serde_json::from_str(json).unwrap();
        assert!(intent.wants_confirm());
    }
}
