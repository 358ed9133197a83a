//! Incident lifecycle

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use companion_core::EmergencyCategory;

/// Escalation state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum IncidentState {
    Open,
    Calling { rung: usize },
    Waiting { rung: usize },
    Reached { rung: usize },
    Failed { rung: usize },
    Escalating { rung: usize },
    Resolved,
    Exhausted,
}

impl IncidentState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Calling { .. } => "calling",
            Self::Waiting { .. } => "waiting",
            Self::Reached { .. } => "reached",
            Self::Failed { .. } => "failed",
            Self::Escalating { .. } => "escalating",
            Self::Resolved => "resolved",
            Self::Exhausted => "exhausted",
        }
    }

    pub fn rung(&self) -> Option<usize> {
        match self {
            Self::Calling { rung }
            | Self::Waiting { rung }
            | Self::Reached { rung }
            | Self::Failed { rung }
            | Self::Escalating { rung } => Some(*rung),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved | Self::Exhausted)
    }
}

/// Invalid state machine transitions.
#[derive(Error, Debug)]
pub enum IncidentError {
    #[error("Invalid incident transition: {from} -> {to}")]
    InvalidTransition { from: &'static str, to: &'static str },

    #[error("Escalation regressed: rung {from} -> {to}")]
    RungRegression { from: usize, to: usize },
}

/// A live emergency. Owned by the emergency dispatcher; other components
/// hold the id only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub id: Uuid,
    pub session_id: String,
    pub severity: u8,
    pub category: EmergencyCategory,
    pub opened_at: DateTime<Utc>,
    pub state: IncidentState,
    pub contacts_attempted: Vec<String>,
    pub contacts_reached: Vec<String>,
    pub closed_at: Option<DateTime<Utc>>,
    next_step_seq: u64,
}

impl Incident {
    pub fn open(session_id: impl Into<String>, severity: u8, category: EmergencyCategory) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id: session_id.into(),
            severity,
            category,
            opened_at: Utc::now(),
            state: IncidentState::Open,
            contacts_attempted: Vec::new(),
            contacts_reached: Vec::new(),
            closed_at: None,
            next_step_seq: 0,
        }
    }

    /// Advance the state machine. Terminal states are final and the
    /// escalation rung never decreases.
    pub fn transition(&mut self, next: IncidentState) -> Result<(), IncidentError> {
        if self.state.is_terminal() {
            return Err(IncidentError::InvalidTransition {
                from: self.state.label(),
                to: next.label(),
            });
        }

        if let (Some(from), Some(to)) = (self.state.rung(), next.rung()) {
            if to < from {
                return Err(IncidentError::RungRegression { from, to });
            }
        }

        if next.is_terminal() {
            self.closed_at = Some(Utc::now());
        }
        self.state = next;
        Ok(())
    }

    /// Allocate the next step sequence number for an idempotent adapter
    /// action.
    pub fn next_step(&mut self) -> u64 {
        self.next_step_seq += 1;
        self.next_step_seq
    }

    /// Reserve a contiguous block of step numbers; returns the first.
    pub fn reserve_steps(&mut self, count: u64) -> u64 {
        let start = self.next_step_seq + 1;
        self.next_step_seq += count;
        start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normal_ladder_progression() {
        let mut incident = Incident::open("s1", 4, EmergencyCategory::Medical);

        incident.transition(IncidentState::Calling { rung: 0 }).unwrap();
        incident.transition(IncidentState::Waiting { rung: 0 }).unwrap();
        incident.transition(IncidentState::Failed { rung: 0 }).unwrap();
        incident.transition(IncidentState::Escalating { rung: 0 }).unwrap();
        incident.transition(IncidentState::Calling { rung: 1 }).unwrap();
        incident.transition(IncidentState::Waiting { rung: 1 }).unwrap();
        incident.transition(IncidentState::Reached { rung: 1 }).unwrap();
        incident.transition(IncidentState::Resolved).unwrap();

        assert!(incident.state.is_terminal());
        assert!(incident.closed_at.is_some());
    }

    #[test]
    fn test_rung_never_regresses() {
        let mut incident = Incident::open("s1", 4, EmergencyCategory::Medical);
        incident.transition(IncidentState::Calling { rung: 2 }).unwrap();

        let err = incident.transition(IncidentState::Calling { rung: 1 }).unwrap_err();
        assert!(matches!(err, IncidentError::RungRegression { from: 2, to: 1 }));
    }

    #[test]
    fn test_terminal_state_is_final() {
        let mut incident = Incident::open("s1", 4, EmergencyCategory::Fall);
        incident.transition(IncidentState::Exhausted).unwrap();

        assert!(incident.transition(IncidentState::Calling { rung: 0 }).is_err());
    }

    #[test]
    fn test_step_seq_monotonic() {
        let mut incident = Incident::open("s1", 3, EmergencyCategory::Fall);
        assert_eq!(incident.next_step(), 1);
        assert_eq!(incident.reserve_steps(4), 2);
        assert_eq!(incident.next_step(), 6);
    }
}
