//! Rules-engine output

use serde::{Deserialize, Serialize};

use crate::intent::Intent;

/// Emergency category, ordered by evaluation priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmergencyCategory {
    Medical,
    Fall,
    Sos,
    Security,
    Distress,
    /// Opened by the post-guard, not by keyword match
    Elevation,
}

impl EmergencyCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Medical => "medical",
            Self::Fall => "fall",
            Self::Sos => "sos",
            Self::Security => "security",
            Self::Distress => "distress",
            Self::Elevation => "elevation",
        }
    }

    /// Categories in tier-evaluation order: medical > fall > sos > security > distress.
    pub fn ordered() -> [EmergencyCategory; 5] {
        [
            Self::Medical,
            Self::Fall,
            Self::Sos,
            Self::Security,
            Self::Distress,
        ]
    }
}

/// Why an utterance was rejected without dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// ASR confidence below the policy threshold
    LowConfidence,
    /// Pre-guard policy denial
    Policy,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LowConfidence => "low_confidence",
            Self::Policy => "policy",
        }
    }
}

/// Output of the rules engine for one utterance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Classification {
    /// Emergency tier hit; bypasses the intent pipeline entirely.
    Emergency {
        /// 1..=4
        severity: u8,
        category: EmergencyCategory,
        /// The keyword that matched
        keyword: String,
    },
    /// A direct tier resolved a full typed intent without the LLM.
    DirectIntent { intent: Intent, rule_id: String },
    /// No rule matched; the LLM stage decides.
    RouteToLlm,
    /// Dropped before any stage.
    Reject { reason: RejectReason },
}

impl Classification {
    pub fn is_emergency(&self) -> bool {
        matches!(self, Self::Emergency { .. })
    }

    /// Label for audit records and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Emergency { .. } => "emergency",
            Self::DirectIntent { .. } => "direct_intent",
            Self::RouteToLlm => "route_to_llm",
            Self::Reject { .. } => "reject",
        }
    }
}
