//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerSettings,

    /// LLM intent endpoint configuration
    #[serde(default)]
    pub llm: LlmSettings,

    /// Stage deadlines
    #[serde(default)]
    pub deadlines: DeadlineSettings,

    /// Adapter endpoints and queue caps
    #[serde(default)]
    pub adapters: AdapterSettings,

    /// Audit log configuration
    #[serde(default)]
    pub audit: AuditSettings,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilitySettings,

    /// Path to the policy document
    #[serde(default = "default_policy_path")]
    pub policy_path: String,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.deadlines.utterance_ms < 500 {
            return Err(ConfigError::InvalidValue {
                field: "deadlines.utterance_ms".to_string(),
                message: "utterance budget too low (minimum 500ms)".to_string(),
            });
        }

        if self.deadlines.emergency_accept_ms > self.deadlines.utterance_ms {
            return Err(ConfigError::InvalidValue {
                field: "deadlines.emergency_accept_ms".to_string(),
                message: "accept budget cannot exceed the utterance budget".to_string(),
            });
        }

        if self.llm.timeout_ms + self.llm.retry_backoff_ms.iter().sum::<u64>()
            > self.deadlines.utterance_ms * 2
        {
            tracing::warn!(
                "LLM timeout plus retries exceeds twice the utterance budget; \
                 retries will usually be truncated by the deadline"
            );
        }

        Ok(())
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum concurrent sessions
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Session idle expiry in seconds
    #[serde(default = "default_session_timeout")]
    pub session_timeout_seconds: u64,

    /// Enable CORS for the family client
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    7080
}
fn default_max_sessions() -> usize {
    64
}
fn default_session_timeout() -> u64 {
    3600
}
fn default_true() -> bool {
    true
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_sessions: default_max_sessions(),
            session_timeout_seconds: default_session_timeout(),
            cors_enabled: default_true(),
        }
    }
}

/// LLM intent endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    /// Intent parse endpoint (vLLM / llama.cpp compatible)
    #[serde(default = "default_llm_url")]
    pub endpoint_url: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Versioned so replays can pin the prompt in force at the time
    #[serde(default = "default_prompt_version")]
    pub system_prompt_version: String,

    /// Hard deadline per request in milliseconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_ms: u64,

    /// Backoff per retry attempt in milliseconds
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: Vec<u64>,
}

fn default_llm_url() -> String {
    "http://127.0.0.1:8000/v1/parse_intent".to_string()
}
fn default_llm_model() -> String {
    "Qwen/Qwen2.5-3B-Instruct".to_string()
}
fn default_prompt_version() -> String {
    "intent-zh-v2".to_string()
}
fn default_llm_timeout() -> u64 {
    1500
}
fn default_retry_backoff() -> Vec<u64> {
    vec![200, 500]
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            endpoint_url: default_llm_url(),
            model: default_llm_model(),
            system_prompt_version: default_prompt_version(),
            timeout_ms: default_llm_timeout(),
            retry_backoff_ms: default_retry_backoff(),
        }
    }
}

/// Stage deadlines
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadlineSettings {
    /// Full per-utterance budget in milliseconds
    #[serde(default = "default_utterance_ms")]
    pub utterance_ms: u64,

    /// Emergency accept budget in milliseconds
    #[serde(default = "default_accept_ms")]
    pub emergency_accept_ms: u64,
}

fn default_utterance_ms() -> u64 {
    2500
}
fn default_accept_ms() -> u64 {
    100
}

impl Default for DeadlineSettings {
    fn default() -> Self {
        Self {
            utterance_ms: default_utterance_ms(),
            emergency_accept_ms: default_accept_ms(),
        }
    }
}

/// Adapter endpoints and queue caps
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterSettings {
    /// External gateway endpoints; empty string means simulated
    #[serde(default)]
    pub endpoints: AdapterEndpoints,

    /// Concurrency cap for smart-home commands
    #[serde(default = "default_smart_home_cap")]
    pub smart_home_concurrency: usize,

    /// Gateway-wide cap on concurrent outbound call placements; each
    /// incident is additionally limited to one call at a time
    #[serde(default = "default_calling_cap")]
    pub calling_concurrency: usize,

    /// Concurrency cap for outbound notifications
    #[serde(default = "default_notify_cap")]
    pub notification_concurrency: usize,

    /// Queue bound per adapter kind
    #[serde(default = "default_queue_bound")]
    pub queue_bound: usize,

    /// Run all adapters in simulated mode (dry-run)
    #[serde(default)]
    pub simulated: bool,
}

fn default_smart_home_cap() -> usize {
    8
}
fn default_calling_cap() -> usize {
    2
}
fn default_notify_cap() -> usize {
    16
}
fn default_queue_bound() -> usize {
    64
}

impl Default for AdapterSettings {
    fn default() -> Self {
        Self {
            endpoints: AdapterEndpoints::default(),
            smart_home_concurrency: default_smart_home_cap(),
            calling_concurrency: default_calling_cap(),
            notification_concurrency: default_notify_cap(),
            queue_bound: default_queue_bound(),
            simulated: false,
        }
    }
}

/// External gateway endpoints. Credentials come from the environment
/// (`COMPANION__ADAPTERS__ENDPOINTS__...`), never from checked-in files.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AdapterEndpoints {
    /// Home-Assistant style smart-home bridge
    #[serde(default)]
    pub smart_home_url: String,

    /// SIP gateway for outbound calls
    #[serde(default)]
    pub sip_gateway_url: String,

    /// SMS / email notification gateway
    #[serde(default)]
    pub notification_url: String,

    /// Bearer token for the smart-home bridge
    #[serde(default)]
    pub smart_home_token: String,

    /// API key for the notification gateway
    #[serde(default)]
    pub notification_api_key: String,
}

/// Audit log configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditSettings {
    /// Segment directory
    #[serde(default = "default_audit_dir")]
    pub dir: String,

    /// Rotate a segment past this size
    #[serde(default = "default_segment_bytes")]
    pub segment_max_bytes: u64,

    /// Days of segments to retain
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_audit_dir() -> String {
    "data/audit".to_string()
}
fn default_segment_bytes() -> u64 {
    64 * 1024 * 1024
}
fn default_retention_days() -> u32 {
    90
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            dir: default_audit_dir(),
            segment_max_bytes: default_segment_bytes(),
            retention_days: default_retention_days(),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilitySettings {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub log_json: bool,

    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilitySettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            metrics_enabled: true,
        }
    }
}

fn default_policy_path() -> String {
    "config/policy.yaml".to_string()
}

/// Load settings from files and environment
///
/// Priority (highest to lowest):
/// 1. Environment variables (COMPANION prefix)
/// 2. config/{env}.yaml (if env specified)
/// 3. config/default.yaml
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder = builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("COMPANION")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 7080);
        assert_eq!(settings.deadlines.utterance_ms, 2500);
        assert_eq!(settings.deadlines.emergency_accept_ms, 100);
        assert_eq!(settings.llm.retry_backoff_ms, vec![200, 500]);
    }

    #[test]
    fn test_settings_validation() {
        let mut settings = Settings::default();
        settings.deadlines.utterance_ms = 100; // Too low
        assert!(settings.validate().is_err());

        settings.deadlines.utterance_ms = 2500;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_accept_budget_bounded_by_utterance_budget() {
        let mut settings = Settings::default();
        settings.deadlines.emergency_accept_ms = 5000;
        assert!(settings.validate().is_err());
    }
}
