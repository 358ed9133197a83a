//! Orchestrator
//!
//! Owns the per-utterance deadline, sequences the stages (pre-guard, rules,
//! optional LLM, post-guard, adapter dispatch) and assembles the response
//! envelope. The emergency branch hands off to the emergency dispatcher and
//! acknowledges immediately. Session context has a single writer: this
//! crate.

mod bus;
mod deadline;
mod orchestrator;
mod responses;
mod session;

pub use bus::{AdapterResultEvent, Bus, GuardVerdictEvent, IntentResolvedEvent};
pub use deadline::Deadline;
pub use orchestrator::Orchestrator;
pub use session::{Session, SessionContext, SessionManager};
