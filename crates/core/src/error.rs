//! Error types for the companion router

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the companion router
#[derive(Error, Debug)]
pub enum Error {
    #[error("Policy error: {0}")]
    Policy(#[from] PolicyError),

    #[error("Intent error: {0}")]
    Intent(#[from] IntentFailure),

    #[error("Adapter error: {0}")]
    Adapter(#[from] AdapterError),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Audit error: {0}")]
    Audit(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn other<S: Into<String>>(msg: S) -> Self {
        Error::Other(msg.into())
    }
}

/// Load-time policy failures. Any of these aborts startup (exit code 2).
#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("Policy file not found: {0}")]
    FileNotFound(String),

    #[error("Policy parse error: {0}")]
    Parse(String),

    #[error("Malformed rule '{rule}': {message}")]
    MalformedRule { rule: String, message: String },

    #[error("Unknown {field} value '{value}'")]
    UnknownEnum { field: String, value: String },

    #[error("Invalid policy value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

/// LLM intent stage failures. Never fabricates an intent; the orchestrator
/// falls back to a conservative chat response.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IntentFailure {
    #[error("Intent request timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("Intent reply is not valid JSON: {0}")]
    MalformedJson(String),

    #[error("Intent reply violates schema: {0}")]
    SchemaViolation(String),

    #[error("Intent field {field} has out-of-vocabulary value '{value}'")]
    Vocabulary { field: String, value: String },

    #[error("Intent transport error: {0}")]
    Transport(String),
}

impl IntentFailure {
    /// Short code for audit records.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "intent_timeout",
            Self::MalformedJson(_) => "intent_malformed_json",
            Self::SchemaViolation(_) => "intent_schema_violation",
            Self::Vocabulary { .. } => "intent_vocabulary",
            Self::Transport(_) => "intent_transport",
        }
    }
}

/// Adapter failures, classified for retry handling.
///
/// Nothing above the adapter layer observes a raw transport error; these are
/// the only shapes that bubble up.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdapterError {
    /// Retried within policy; surfaces only when retries are exhausted
    #[error("Transient adapter failure: {0}")]
    Transient(String),

    /// Never retried; safety-critical devices trigger a caregiver notification
    #[error("Permanent adapter failure: {0}")]
    Permanent(String),

    /// Queue overflow; user hears "try again"
    #[error("Adapter queue full")]
    Busy,

    /// Job deadline elapsed before the adapter finished
    #[error("Adapter deadline exceeded")]
    DeadlineExceeded,
}

impl AdapterError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Busy)
    }
}
