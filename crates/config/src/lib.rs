//! Configuration for the companion router
//!
//! Runtime settings (endpoints, deadlines, queue caps) live here and are
//! loaded from YAML files plus `COMPANION__` environment overrides. The
//! behavioral policy (fences, keyword sets, contact ladder) is a separate
//! versioned document owned by `companion-policy`.

mod settings;

pub use settings::{
    load_settings, AdapterEndpoints, AdapterSettings, AuditSettings, DeadlineSettings, LlmSettings,
    ObservabilitySettings, ServerSettings, Settings,
};

use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config load error: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}
