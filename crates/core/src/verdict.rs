//! Guard verdicts

use serde::{Deserialize, Serialize};

/// Decision reached by the pre- or post-guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardDecision {
    Allow,
    Deny,
    /// Proceed only after an explicit second utterance within the confirmation window
    AllowWithConfirm,
    /// Deny the action and open an elevation incident to notify caregivers
    Elevate,
}

impl GuardDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
            Self::AllowWithConfirm => "allow_with_confirm",
            Self::Elevate => "elevate",
        }
    }
}

/// Result of one guard check.
///
/// `Deny` guarantees no adapter dispatch happens for the utterance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardVerdict {
    pub decision: GuardDecision,
    /// Reason codes, most specific first
    #[serde(default)]
    pub reasons: Vec<String>,
    /// Policy constraints the intent violated
    #[serde(default)]
    pub constraints_violated: Vec<String>,
    /// User-facing confirmation prompt, set for AllowWithConfirm
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirm_prompt: Option<String>,
}

impl GuardVerdict {
    pub fn allow() -> Self {
        Self {
            decision: GuardDecision::Allow,
            reasons: Vec::new(),
            constraints_violated: Vec::new(),
            confirm_prompt: None,
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            decision: GuardDecision::Deny,
            reasons: vec![reason.into()],
            constraints_violated: Vec::new(),
            confirm_prompt: None,
        }
    }

    pub fn deny_constraint(reason: impl Into<String>, constraint: impl Into<String>) -> Self {
        Self {
            decision: GuardDecision::Deny,
            reasons: vec![reason.into()],
            constraints_violated: vec![constraint.into()],
            confirm_prompt: None,
        }
    }

    pub fn with_confirm(reason: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            decision: GuardDecision::AllowWithConfirm,
            reasons: vec![reason.into()],
            constraints_violated: Vec::new(),
            confirm_prompt: Some(prompt.into()),
        }
    }

    pub fn elevate(reason: impl Into<String>) -> Self {
        Self {
            decision: GuardDecision::Elevate,
            reasons: vec![reason.into()],
            constraints_violated: Vec::new(),
            confirm_prompt: None,
        }
    }

    pub fn is_deny(&self) -> bool {
        self.decision == GuardDecision::Deny
    }
}
