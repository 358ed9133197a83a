//! Structured audit log
//!
//! Every branch point in the pipeline emits an [`AuditRecord`]: which rule
//! fired, what the guards decided, how long the LLM took, how each adapter
//! job ended. Records carry a monotonic per-incident sequence number and a
//! payload hash, so a decision can be reconstructed offline from the log
//! plus the policy snapshot and the utterance.
//!
//! Storage is an append-only segmented JSONL file, one segment per day,
//! rotated early when a segment exceeds the size bound. A single writer task
//! serializes all appends.

mod record;
mod sink;

pub use record::{AuditEvent, AuditRecord};
pub use sink::AuditSink;
