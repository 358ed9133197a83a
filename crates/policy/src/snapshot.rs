//! Compiled, immutable policy snapshot
//!
//! Compilation validates everything the runtime relies on: regex patterns,
//! severity and risk ranges, ladder shape, scene ratios. A snapshot that
//! compiled is safe to evaluate without further error handling, which keeps
//! the rules engine a pure function.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use regex::Regex;
use sha2::{Digest, Sha256};

use companion_core::{EmergencyCategory, Language, PolicyError};

use crate::document::{PolicyDocument, RetryDoc, TimerDoc};

/// Compiled device access control.
#[derive(Debug, Clone)]
pub struct DeviceFence {
    pub device_id: String,
    pub device_type: String,
    pub room: String,
    pub risk_level: u8,
    pub allowed_actions: BTreeSet<String>,
    pub require_confirm_actions: BTreeSet<String>,
    pub safety_critical: bool,
}

/// Compiled geographic fence.
#[derive(Debug, Clone)]
pub struct GeoFence {
    pub zone_id: String,
    pub polygon: Vec<(f64, f64)>,
    pub risk_level: u8,
    pub allowed_devices: BTreeSet<String>,
}

/// Compiled SOS keyword set. Keywords are lowercased at compile time.
#[derive(Debug, Clone)]
pub struct SosSet {
    pub category: EmergencyCategory,
    pub severity: u8,
    pub keywords: BTreeMap<Language, Vec<String>>,
}

/// Compiled pre-guard rules.
#[derive(Debug, Clone)]
pub struct PreGuardRules {
    pub banned_phrases: Vec<String>,
    pub injection_patterns: Vec<Regex>,
    pub max_text_chars: usize,
}

/// Compiled smart-home phrase rule.
#[derive(Debug, Clone)]
pub struct SmartHomeRule {
    pub rule_id: String,
    pub pattern: Regex,
    pub device: String,
    pub action: String,
    pub room: Option<String>,
    pub specificity: u8,
}

/// Assist-move direct tier configuration.
#[derive(Debug, Clone)]
pub struct AssistMoveRules {
    pub verbs: Vec<String>,
    /// Lowercased phrase -> canonical target
    pub target_phrases: Vec<(String, String)>,
    pub canonical_targets: BTreeSet<String>,
    pub max_speed: String,
}

/// Call-family phrase mapped to a ladder contact.
#[derive(Debug, Clone)]
pub struct CallRule {
    pub phrase: String,
    pub contact_id: String,
}

/// Token-bucket parameters for one intent kind.
#[derive(Debug, Clone, Copy)]
pub struct RateLimit {
    pub max_per_minute: u32,
    pub burst_multiplier: f32,
}

/// Retry configuration shared by the adapter layer and the ladder.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub adapter_max_retries: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub call_place_retries: u32,
    pub call_place_backoff_ms: u64,
    pub notification_retries: u32,
}

impl From<&RetryDoc> for RetryPolicy {
    fn from(doc: &RetryDoc) -> Self {
        Self {
            adapter_max_retries: doc.adapter_max_retries,
            base_backoff_ms: doc.base_backoff_ms,
            max_backoff_ms: doc.max_backoff_ms,
            call_place_retries: doc.call_place_retries,
            call_place_backoff_ms: doc.call_place_backoff_ms,
            notification_retries: doc.notification_retries,
        }
    }
}

/// Emergency scene batch.
#[derive(Debug, Clone)]
pub struct EmergencyScene {
    pub commands: Vec<(String, String)>,
    pub min_success_ratio: f32,
}

/// Windows and thresholds.
#[derive(Debug, Clone, Copy)]
pub struct Timers {
    pub reject_confidence: f32,
    pub attention_window_seconds: u64,
    pub confirm_window_seconds: u64,
    pub quench_window_seconds: u64,
    pub high_risk_threshold: u8,
    pub stress_threshold: f32,
}

impl From<&TimerDoc> for Timers {
    fn from(doc: &TimerDoc) -> Self {
        Self {
            reject_confidence: doc.reject_confidence,
            attention_window_seconds: doc.attention_window_seconds,
            confirm_window_seconds: doc.confirm_window_seconds,
            quench_window_seconds: doc.quench_window_seconds,
            high_risk_threshold: doc.high_risk_threshold,
            stress_threshold: doc.stress_threshold,
        }
    }
}

/// The immutable policy version in force for the duration of an utterance.
#[derive(Debug, Clone)]
pub struct PolicySnapshot {
    pub version: String,
    pub device_fences: HashMap<String, DeviceFence>,
    pub geo_fences: Vec<GeoFence>,
    pub contact_ladder: Vec<crate::document::ContactRung>,
    /// Ordered medical > fall > sos > security > distress
    pub sos_sets: Vec<SosSet>,
    pub wakewords: Vec<String>,
    pub pre_guard: PreGuardRules,
    pub smart_home_rules: Vec<SmartHomeRule>,
    pub assist_move: AssistMoveRules,
    pub call_rules: Vec<CallRule>,
    pub rate_limits: HashMap<String, RateLimit>,
    pub retry: RetryPolicy,
    pub emergency_scene: EmergencyScene,
    pub timers: Timers,
    /// sha256 over the sorted domain vocabulary, sent with every LLM request
    pub vocabulary_hash: String,
}

impl PolicySnapshot {
    /// Validate and compile a document. All failures here are load-time.
    pub fn compile(doc: &PolicyDocument) -> Result<Self, PolicyError> {
        if doc.contact_ladder.is_empty() {
            return Err(PolicyError::InvalidValue {
                field: "contact_ladder".to_string(),
                message: "escalation ladder must have at least one rung".to_string(),
            });
        }

        let mut device_fences = HashMap::new();
        for (device_id, fence) in &doc.device_fences {
            check_range("device_fences.risk_level", fence.risk_level)?;
            device_fences.insert(
                device_id.clone(),
                DeviceFence {
                    device_id: device_id.clone(),
                    device_type: fence.device_type.clone(),
                    room: fence.room.clone(),
                    risk_level: fence.risk_level,
                    allowed_actions: fence.allowed_actions.iter().cloned().collect(),
                    require_confirm_actions: fence.require_confirm_actions.iter().cloned().collect(),
                    safety_critical: fence.safety_critical,
                },
            );
        }

        let mut geo_fences = Vec::new();
        for fence in &doc.geo_fences {
            check_range("geo_fences.risk_level", fence.risk_level)?;
            if fence.polygon.len() < 3 {
                return Err(PolicyError::MalformedRule {
                    rule: fence.zone_id.clone(),
                    message: "geofence polygon needs at least 3 vertices".to_string(),
                });
            }
            geo_fences.push(GeoFence {
                zone_id: fence.zone_id.clone(),
                polygon: fence.polygon.clone(),
                risk_level: fence.risk_level,
                allowed_devices: fence.allowed_devices.iter().cloned().collect(),
            });
        }

        let mut sos_sets = Vec::new();
        for set in &doc.sos_sets {
            check_range("sos_sets.severity", set.severity)?;
            sos_sets.push(SosSet {
                category: set.category,
                severity: set.severity,
                keywords: set
                    .keywords
                    .iter()
                    .map(|(lang, words)| {
                        (*lang, words.iter().map(|w| w.to_lowercase()).collect())
                    })
                    .collect(),
            });
        }
        // Tie-break order is fixed by category priority, whatever the document order
        sos_sets.sort_by_key(|s| {
            EmergencyCategory::ordered()
                .iter()
                .position(|c| *c == s.category)
                .unwrap_or(usize::MAX)
        });

        let mut injection_patterns = Vec::new();
        for pattern in &doc.pre_guard.injection_patterns {
            injection_patterns.push(compile_pattern("pre_guard.injection_patterns", pattern)?);
        }
        let pre_guard = PreGuardRules {
            banned_phrases: doc
                .pre_guard
                .banned_phrases
                .iter()
                .map(|p| p.to_lowercase())
                .collect(),
            injection_patterns,
            max_text_chars: doc.pre_guard.max_text_chars,
        };

        let mut smart_home_rules = Vec::new();
        for rule in &doc.smart_home_rules {
            let fence = device_fences.get(&rule.device).ok_or_else(|| PolicyError::UnknownEnum {
                field: format!("smart_home_rules.{}.device", rule.rule_id),
                value: rule.device.clone(),
            })?;
            if !fence.allowed_actions.contains(&rule.action) {
                return Err(PolicyError::UnknownEnum {
                    field: format!("smart_home_rules.{}.action", rule.rule_id),
                    value: rule.action.clone(),
                });
            }
            smart_home_rules.push(SmartHomeRule {
                rule_id: rule.rule_id.clone(),
                pattern: compile_pattern(&rule.rule_id, &rule.pattern)?,
                device: rule.device.clone(),
                action: rule.action.clone(),
                room: rule.room.clone(),
                specificity: rule.specificity,
            });
        }

        let call_rules = doc
            .call_phrases
            .iter()
            .map(|(phrase, contact_id)| CallRule {
                phrase: phrase.to_lowercase(),
                contact_id: contact_id.clone(),
            })
            .collect::<Vec<_>>();
        for rule in &call_rules {
            if !doc.contact_ladder.iter().any(|c| c.contact_id == rule.contact_id) {
                return Err(PolicyError::UnknownEnum {
                    field: "call_phrases".to_string(),
                    value: rule.contact_id.clone(),
                });
            }
        }

        if !(0.0..=1.0).contains(&doc.scene_min_success_ratio) {
            return Err(PolicyError::InvalidValue {
                field: "scene_min_success_ratio".to_string(),
                message: "ratio must be within [0, 1]".to_string(),
            });
        }
        for entry in &doc.emergency_scene {
            if !device_fences.contains_key(&entry.device) {
                return Err(PolicyError::UnknownEnum {
                    field: "emergency_scene.device".to_string(),
                    value: entry.device.clone(),
                });
            }
        }

        let rate_limits = doc
            .rate_limits
            .iter()
            .map(|(kind, limit)| {
                (
                    kind.clone(),
                    RateLimit {
                        max_per_minute: limit.max_per_minute,
                        burst_multiplier: limit.burst_multiplier,
                    },
                )
            })
            .collect();

        let vocabulary_hash = vocabulary_hash(doc);

        Ok(Self {
            version: doc.version.clone(),
            device_fences,
            geo_fences,
            contact_ladder: doc.contact_ladder.clone(),
            sos_sets,
            wakewords: doc.wakewords.iter().map(|w| w.to_lowercase()).collect(),
            pre_guard,
            smart_home_rules,
            assist_move: AssistMoveRules {
                verbs: doc.assist_move_verbs.iter().map(|v| v.to_lowercase()).collect(),
                target_phrases: doc
                    .assist_move_targets
                    .iter()
                    .map(|(phrase, target)| (phrase.to_lowercase(), target.clone()))
                    .collect(),
                canonical_targets: doc.assist_move_targets.values().cloned().collect(),
                max_speed: doc.max_assist_speed.clone(),
            },
            call_rules,
            rate_limits,
            retry: RetryPolicy::from(&doc.retry),
            emergency_scene: EmergencyScene {
                commands: doc
                    .emergency_scene
                    .iter()
                    .map(|e| (e.device.clone(), e.action.clone()))
                    .collect(),
                min_success_ratio: doc.scene_min_success_ratio,
            },
            timers: Timers::from(&doc.timers),
            vocabulary_hash,
        })
    }

    /// Device fence lookup.
    pub fn device(&self, device_id: &str) -> Option<&DeviceFence> {
        self.device_fences.get(device_id)
    }

    /// Geofence whose zone id matches.
    pub fn zone(&self, zone_id: &str) -> Option<&GeoFence> {
        self.geo_fences.iter().find(|f| f.zone_id == zone_id)
    }

    /// Ladder rung by contact id.
    pub fn contact(&self, contact_id: &str) -> Option<&crate::document::ContactRung> {
        self.contact_ladder.iter().find(|c| c.contact_id == contact_id)
    }
}

fn check_range(field: &str, value: u8) -> Result<(), PolicyError> {
    if !(1..=4).contains(&value) {
        return Err(PolicyError::InvalidValue {
            field: field.to_string(),
            message: format!("expected 1..=4, got {}", value),
        });
    }
    Ok(())
}

fn compile_pattern(rule: &str, pattern: &str) -> Result<Regex, PolicyError> {
    Regex::new(pattern).map_err(|e| PolicyError::MalformedRule {
        rule: rule.to_string(),
        message: e.to_string(),
    })
}

/// Deterministic hash over the domain vocabulary. Sent with each LLM request
/// so replay tests can prove which vocabulary produced a classification.
fn vocabulary_hash(doc: &PolicyDocument) -> String {
    let mut entries: Vec<String> = Vec::new();

    for (device_id, fence) in &doc.device_fences {
        entries.push(format!("device:{}", device_id));
        entries.push(format!("room:{}", fence.room));
        for action in &fence.allowed_actions {
            entries.push(format!("action:{}", action));
        }
    }
    for target in doc.assist_move_targets.values() {
        entries.push(format!("target:{}", target));
    }
    for contact in &doc.contact_ladder {
        entries.push(format!("callee:{}", contact.contact_id));
    }

    entries.sort();
    entries.dedup();

    let mut hasher = Sha256::new();
    for entry in &entries {
        hasher.update(entry.as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}
