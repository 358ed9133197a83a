//! Emergency bypass path
//!
//! From an `Emergency` classification to the first outbound action attempt
//! the elapsed wall time must stay inside the accept budget; the audio path
//! gets its acknowledgement back immediately while the fan-out (call ladder,
//! emergency scene, video uplink, notifications) proceeds independently.
//!
//! The escalation ladder is strictly ordered and never regresses. An active
//! incident is closed only by a human acknowledgement or by ladder
//! exhaustion, never by utterance-level deadlines.

mod dispatcher;
mod incident;

pub use dispatcher::{EmergencyDispatcher, IncidentEvent, OpenOutcome, OpenRequest};
pub use incident::{Incident, IncidentError, IncidentState};
