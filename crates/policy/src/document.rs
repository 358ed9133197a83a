//! On-disk policy document
//!
//! This is the serde-facing shape: plain data, no compiled patterns. It
//! round-trips through YAML unchanged; compilation into a runtime snapshot
//! happens in [`crate::snapshot`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use companion_core::{EmergencyCategory, Language};

/// Versioned policy document as persisted on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDocument {
    pub version: String,

    /// Device access control, keyed by device id
    #[serde(default)]
    pub device_fences: BTreeMap<String, DeviceFenceDoc>,

    /// Geographic fences with polygon vertices
    #[serde(default)]
    pub geo_fences: Vec<GeoFenceDoc>,

    /// Emergency contact ladder, highest priority first
    #[serde(default)]
    pub contact_ladder: Vec<ContactRung>,

    /// SOS keyword sets by category
    #[serde(default)]
    pub sos_sets: Vec<SosSetDoc>,

    /// Wakewords that open the attention window
    #[serde(default)]
    pub wakewords: Vec<String>,

    /// Pre-guard text rules
    #[serde(default)]
    pub pre_guard: PreGuardDoc,

    /// Direct smart-home phrase rules
    #[serde(default)]
    pub smart_home_rules: Vec<SmartHomeRuleDoc>,

    /// Assist-move verbs and allowed targets (phrase -> canonical target)
    #[serde(default)]
    pub assist_move_verbs: Vec<String>,
    #[serde(default)]
    pub assist_move_targets: BTreeMap<String, String>,
    /// Fastest speed the guard will allow for assisted movement
    #[serde(default = "default_max_speed")]
    pub max_assist_speed: String,

    /// Call-family phrases mapped to ladder contacts
    #[serde(default)]
    pub call_phrases: BTreeMap<String, String>,

    /// Rate limits keyed by intent kind
    #[serde(default)]
    pub rate_limits: BTreeMap<String, RateLimitDoc>,

    /// Adapter retry configuration
    #[serde(default)]
    pub retry: RetryDoc,

    /// Emergency scene applied on incident open
    #[serde(default)]
    pub emergency_scene: Vec<SceneEntry>,
    #[serde(default = "default_scene_ratio")]
    pub scene_min_success_ratio: f32,

    /// Windows and thresholds
    #[serde(default)]
    pub timers: TimerDoc,
}

fn default_max_speed() -> String {
    "normal".to_string()
}
fn default_scene_ratio() -> f32 {
    0.5
}

/// Device access control definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceFenceDoc {
    pub device_type: String,
    pub room: String,
    /// 1 = low, 4 = critical
    pub risk_level: u8,
    pub allowed_actions: Vec<String>,
    #[serde(default)]
    pub require_confirm_actions: Vec<String>,
    /// Failures on this device notify the caregiver
    #[serde(default)]
    pub safety_critical: bool,
}

/// Geographic fence definition. Polygon vertices are 2D points in the
/// home coordinate frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoFenceDoc {
    pub zone_id: String,
    pub polygon: Vec<(f64, f64)>,
    pub risk_level: u8,
    #[serde(default)]
    pub allowed_devices: Vec<String>,
}

/// One rung of the escalation ladder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactRung {
    pub contact_id: String,
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub email: Option<String>,
    /// Seconds to wait for an ack before escalating past this rung
    pub timeout_seconds: u64,
    #[serde(default = "default_true")]
    pub sms_enabled: bool,
}

fn default_true() -> bool {
    true
}

/// SOS keyword set for one emergency category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SosSetDoc {
    pub category: EmergencyCategory,
    /// 1..=4
    pub severity: u8,
    /// Keywords per language
    pub keywords: BTreeMap<Language, Vec<String>>,
}

/// Pre-guard text rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PreGuardDoc {
    /// Denied outright regardless of intent
    #[serde(default)]
    pub banned_phrases: Vec<String>,
    /// Regex patterns for known prompt-injection shapes
    #[serde(default)]
    pub injection_patterns: Vec<String>,
    /// Utterances longer than this are rejected
    #[serde(default = "default_max_len")]
    pub max_text_chars: usize,
}

fn default_max_len() -> usize {
    400
}

/// One direct smart-home phrase rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmartHomeRuleDoc {
    pub rule_id: String,
    /// Regex matched against the lowercased utterance
    pub pattern: String,
    pub device: String,
    pub action: String,
    #[serde(default)]
    pub room: Option<String>,
    /// Higher wins on equal match length (device+room > device > class)
    #[serde(default)]
    pub specificity: u8,
}

/// Rate limit for one intent kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitDoc {
    pub max_per_minute: u32,
    #[serde(default = "default_burst")]
    pub burst_multiplier: f32,
}

fn default_burst() -> f32 {
    1.5
}

/// Adapter retry configuration. Versioned with the rest of policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryDoc {
    /// Max retries for transient adapter failures
    pub adapter_max_retries: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Call placement retries within one ladder rung
    pub call_place_retries: u32,
    pub call_place_backoff_ms: u64,
    /// Notification retries (independent of the ladder)
    pub notification_retries: u32,
}

impl Default for RetryDoc {
    fn default() -> Self {
        Self {
            adapter_max_retries: 3,
            base_backoff_ms: 100,
            max_backoff_ms: 2000,
            call_place_retries: 2,
            call_place_backoff_ms: 500,
            notification_retries: 3,
        }
    }
}

/// One device command in the emergency scene batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneEntry {
    pub device: String,
    pub action: String,
}

/// Windows and thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerDoc {
    /// Reject below this ASR confidence
    pub reject_confidence: f32,
    /// Attention window opened by a wakeword, seconds
    pub attention_window_seconds: u64,
    /// High-risk confirmation window, seconds
    pub confirm_window_seconds: u64,
    /// Same-cause emergencies within this window join the open incident
    pub quench_window_seconds: u64,
    /// Device risk at or above this requires confirmation
    pub high_risk_threshold: u8,
    /// Stress reading above this elevates sensitive intents
    pub stress_threshold: f32,
}

impl Default for TimerDoc {
    fn default() -> Self {
        Self {
            reject_confidence: 0.3,
            attention_window_seconds: 30,
            confirm_window_seconds: 30,
            quench_window_seconds: 300,
            high_risk_threshold: 3,
            stress_threshold: 0.7,
        }
    }
}
