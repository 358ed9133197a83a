//! Strict-schema parsing and vocabulary validation

use serde::Deserialize;

use companion_core::{Intent, IntentFailure};
use companion_policy::PolicySnapshot;

/// Reasons the LLM may attach to a call.emergency intent.
const CALL_REASONS: &[&str] = &[
    "fall",
    "chest_pain",
    "breathing_difficulty",
    "confusion",
    "general_emergency",
    "user_request",
];

/// Chat styles the TTS collaborator knows how to render.
const CHAT_STYLES: &[&str] = &["greeting", "comfort", "casual", "story", "joke"];

const ASSIST_SPEEDS: &[&str] = &["slow", "normal", "fast"];

/// Flat superset of every intent shape. `deny_unknown_fields` closes the
/// schema; [`RawIntent::into_intent`] then checks per-kind requirements.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawIntent {
    intent: String,
    device: Option<String>,
    action: Option<String>,
    room: Option<String>,
    target: Option<String>,
    speed: Option<String>,
    callee: Option<String>,
    reason: Option<String>,
    style: Option<String>,
    confirm: Option<bool>,
}

impl RawIntent {
    fn into_intent(self) -> Result<Intent, IntentFailure> {
        match self.intent.as_str() {
            "smart.home" => {
                self.forbid("target", self.target.is_some())?;
                self.forbid("callee", self.callee.is_some())?;
                Ok(Intent::SmartHome {
                    device: self.require("device", self.device.clone())?,
                    action: self.require("action", self.action.clone())?,
                    room: self.room,
                    confirm: self.confirm.unwrap_or(false),
                })
            }
            "assist.move" => {
                self.forbid("device", self.device.is_some())?;
                self.forbid("callee", self.callee.is_some())?;
                Ok(Intent::AssistMove {
                    target: self.require("target", self.target.clone())?,
                    speed: self.speed,
                    confirm: self.confirm.unwrap_or(true),
                })
            }
            "call.emergency" => {
                self.forbid("device", self.device.is_some())?;
                self.forbid("target", self.target.is_some())?;
                // The schema pins confirm to true for calls
                if self.confirm == Some(false) {
                    return Err(IntentFailure::SchemaViolation(
                        "call.emergency requires confirm=true".to_string(),
                    ));
                }
                Ok(Intent::CallEmergency {
                    callee: self.require("callee", self.callee.clone())?,
                    reason: self.require("reason", self.reason.clone())?,
                    confirm: true,
                })
            }
            "chat" => {
                self.forbid("device", self.device.is_some())?;
                self.forbid("target", self.target.is_some())?;
                self.forbid("callee", self.callee.is_some())?;
                Ok(Intent::Chat { style: self.style })
            }
            other => Err(IntentFailure::SchemaViolation(format!(
                "unknown intent kind '{}'",
                other
            ))),
        }
    }

    fn require(&self, field: &str, value: Option<String>) -> Result<String, IntentFailure> {
        value.ok_or_else(|| {
            IntentFailure::SchemaViolation(format!(
                "{} requires field '{}'",
                self.intent, field
            ))
        })
    }

    fn forbid(&self, field: &str, present: bool) -> Result<(), IntentFailure> {
        if present {
            return Err(IntentFailure::SchemaViolation(format!(
                "{} does not take field '{}'",
                self.intent, field
            )));
        }
        Ok(())
    }
}

/// Parse a reply into a typed intent, enforcing strict JSON.
///
/// Trailing tokens after the closing brace are a schema violation, not
/// something to silently strip.
pub fn parse_strict(reply: &str) -> Result<Intent, IntentFailure> {
    let mut de = serde_json::Deserializer::from_str(reply.trim());
    let raw = RawIntent::deserialize(&mut de).map_err(classify_error)?;
    de.end().map_err(|_| {
        IntentFailure::SchemaViolation("trailing tokens after JSON object".to_string())
    })?;

    raw.into_intent()
}

fn classify_error(err: serde_json::Error) -> IntentFailure {
    use serde_json::error::Category;
    match err.classify() {
        Category::Syntax | Category::Eof | Category::Io => {
            IntentFailure::MalformedJson(err.to_string())
        }
        Category::Data => IntentFailure::SchemaViolation(err.to_string()),
    }
}

/// Check every enum-valued field against the policy vocabulary.
pub fn validate_vocabulary(
    intent: &Intent,
    snapshot: &PolicySnapshot,
) -> Result<(), IntentFailure> {
    let fail = |field: &str, value: &str| {
        Err(IntentFailure::Vocabulary {
            field: field.to_string(),
            value: value.to_string(),
        })
    };

    match intent {
        Intent::SmartHome { device, action, room, .. } => {
            let Some(fence) = snapshot.device(device) else {
                return fail("device", device);
            };
            if !fence.allowed_actions.contains(action) {
                return fail("action", action);
            }
            if let Some(room) = room {
                if !snapshot.device_fences.values().any(|f| &f.room == room) {
                    return fail("room", room);
                }
            }
        }
        Intent::AssistMove { target, speed, .. } => {
            if !snapshot.assist_move.canonical_targets.contains(target) {
                return fail("target", target);
            }
            if let Some(speed) = speed {
                if !ASSIST_SPEEDS.contains(&speed.as_str()) {
                    return fail("speed", speed);
                }
            }
        }
        Intent::CallEmergency { callee, reason, .. } => {
            if snapshot.contact(callee).is_none() {
                return fail("callee", callee);
            }
            if !CALL_REASONS.contains(&reason.as_str()) {
                return fail("reason", reason);
            }
        }
        Intent::Chat { style } => {
            if let Some(style) = style {
                if !CHAT_STYLES.contains(&style.as_str()) {
                    return fail("style", style);
                }
            }
        }
    }

    Ok(())
}
