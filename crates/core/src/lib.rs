//! Core types for the companion router
//!
//! This crate provides foundational types used across all other crates:
//! - Utterances as delivered by the ASR edge
//! - Classifications, intents, and guard verdicts
//! - Response envelopes for the TTS edge
//! - Error types

pub mod classification;
pub mod envelope;
pub mod error;
pub mod intent;
pub mod utterance;
pub mod verdict;

pub use classification::{Classification, EmergencyCategory, RejectReason};
pub use envelope::{Outcome, ResponseEnvelope, Urgency};
pub use error::{AdapterError, Error, IntentFailure, PolicyError, Result};
pub use intent::Intent;
pub use utterance::{AudioInEvent, Language, Utterance};
pub use verdict::{GuardDecision, GuardVerdict};
