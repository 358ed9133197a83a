//! LLM intent stage
//!
//! Turns free text into a typed [`Intent`](companion_core::Intent) conforming
//! to a closed schema. The reply must be a single strict JSON object: no
//! trailing tokens, no unknown fields, all kind-required fields present and
//! inside the policy vocabulary. Anything else is an `IntentFailure`; the
//! orchestrator never fabricates an intent from a bad reply.

mod client;
mod schema;

pub use client::{IntentClient, IntentParser, IntentRequest};
pub use schema::{parse_strict, validate_vocabulary};
