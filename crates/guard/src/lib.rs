//! Guard engine: rules-first classification plus pre/post policy checks
//!
//! The rules engine decides as much as possible before the LLM ever runs.
//! The pre-guard rejects text that policy forbids regardless of intent; the
//! post-guard enforces policy on typed intents independent of the LLM's good
//! behavior. All three consult the same immutable policy snapshot.

mod post;
mod pre;
mod rate_limit;
mod rules;

pub use post::PostGuard;
pub use pre::PreGuard;
pub use rate_limit::RateLimiterRegistry;
pub use rules::{RulesEngine, RulesOutcome};

use serde::{Deserialize, Serialize};

/// Read-only view of session state, taken at a stage boundary.
///
/// The orchestrator owns the live session context; guards only ever see this
/// cheap snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionView {
    /// Last known geofence zone, if position tracking has reported one
    pub last_zone: Option<String>,
    /// Last emotion stress reading in [0, 1], decayed
    pub stress: Option<f32>,
    /// Wakeword attention window currently open
    pub attention_open: bool,
    /// A non-terminal incident exists for this session
    pub has_active_incident: bool,
}
