//! HTTP client for the external LLM intent endpoint

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;

use companion_config::LlmSettings;
use companion_core::{Intent, IntentFailure, Utterance};
use companion_policy::PolicySnapshot;

use crate::schema::{parse_strict, validate_vocabulary};

/// Request body sent to the intent endpoint.
///
/// The vocabulary hash and session-summary fingerprint make replies
/// reproducible in replay tests.
#[derive(Debug, Clone, Serialize)]
pub struct IntentRequest<'a> {
    pub system_prompt_version: &'a str,
    pub user_text: &'a str,
    pub session_summary: &'a str,
    pub domain_vocabulary_hash: &'a str,
}

/// The seam the orchestrator calls through; tests substitute a stub.
#[async_trait]
pub trait IntentParser: Send + Sync {
    /// Parse free text into a typed intent within the remaining deadline.
    async fn parse(
        &self,
        utterance: &Utterance,
        session_summary: &str,
        snapshot: &PolicySnapshot,
        remaining: Duration,
    ) -> Result<Intent, IntentFailure>;
}

/// reqwest-backed intent client with bounded retries.
pub struct IntentClient {
    http: reqwest::Client,
    settings: LlmSettings,
}

impl IntentClient {
    pub fn new(settings: LlmSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            settings,
        }
    }

    async fn attempt(
        &self,
        request: &IntentRequest<'_>,
        timeout: Duration,
        snapshot: &PolicySnapshot,
    ) -> Result<Intent, IntentFailure> {
        let started = Instant::now();

        let send = self
            .http
            .post(&self.settings.endpoint_url)
            .json(request)
            .send();

        let response = tokio::time::timeout(timeout, send)
            .await
            .map_err(|_| IntentFailure::Timeout {
                elapsed_ms: started.elapsed().as_millis() as u64,
            })?
            .map_err(|e| IntentFailure::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(IntentFailure::Transport(format!(
                "endpoint returned {}",
                response.status()
            )));
        }

        let body = tokio::time::timeout(timeout.saturating_sub(started.elapsed()), response.text())
            .await
            .map_err(|_| IntentFailure::Timeout {
                elapsed_ms: started.elapsed().as_millis() as u64,
            })?
            .map_err(|e| IntentFailure::Transport(e.to_string()))?;

        let intent = parse_strict(&body)?;
        validate_vocabulary(&intent, snapshot)?;
        Ok(intent)
    }
}

#[async_trait]
impl IntentParser for IntentClient {
    async fn parse(
        &self,
        utterance: &Utterance,
        session_summary: &str,
        snapshot: &PolicySnapshot,
        remaining: Duration,
    ) -> Result<Intent, IntentFailure> {
        let request = IntentRequest {
            system_prompt_version: &self.settings.system_prompt_version,
            user_text: &utterance.text,
            session_summary,
            domain_vocabulary_hash: &snapshot.vocabulary_hash,
        };

        let deadline = Instant::now() + remaining;
        let per_attempt = Duration::from_millis(self.settings.timeout_ms);
        let mut last_failure = IntentFailure::Timeout { elapsed_ms: 0 };

        // First attempt plus one retry per configured backoff step
        for attempt in 0..=self.settings.retry_backoff_ms.len() {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return Err(IntentFailure::Timeout {
                    elapsed_ms: remaining.as_millis() as u64,
                });
            }

            match self.attempt(&request, per_attempt.min(left), snapshot).await {
                Ok(intent) => {
                    tracing::debug!(
                        utterance_id = utterance.id,
                        kind = intent.kind(),
                        attempt,
                        "Intent resolved"
                    );
                    return Ok(intent);
                }
                Err(failure) => {
                    tracing::warn!(
                        utterance_id = utterance.id,
                        attempt,
                        code = failure.code(),
                        "Intent attempt failed"
                    );
                    last_failure = failure;
                }
            }

            if let Some(backoff_ms) = self.settings.retry_backoff_ms.get(attempt) {
                let backoff = Duration::from_millis(*backoff_ms);
                if Instant::now() + backoff >= deadline {
                    break;
                }
                tokio::time::sleep(backoff).await;
            }
        }

        Err(last_failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use companion_core::Language;
    use companion_policy::{default_document, PolicySnapshot};

    fn utterance(text: &str) -> Utterance {
        Utterance {
            id: 1,
            session_id: "s1".to_string(),
            text: text.to_string(),
            language: Language::Zh,
            asr_conf: 0.9,
            t_arrival: Utc::now(),
            speaker_profile_id: None,
        }
    }

    #[tokio::test]
    async fn test_exhausted_budget_is_timeout() {
        let client = IntentClient::new(LlmSettings::default());
        let snapshot = PolicySnapshot::compile(&default_document()).unwrap();

        let result = client
            .parse(&utterance("讲个笑话"), "", &snapshot, Duration::ZERO)
            .await;

        assert!(matches!(result, Err(IntentFailure::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_surfaces_failure() {
        let mut settings = LlmSettings::default();
        // Reserved TEST-NET address, nothing listens here
        settings.endpoint_url = "http://192.0.2.1:1/parse_intent".to_string();
        settings.timeout_ms = 50;
        settings.retry_backoff_ms = vec![10];

        let client = IntentClient::new(settings);
        let snapshot = PolicySnapshot::compile(&default_document()).unwrap();

        let result = client
            .parse(
                &utterance("讲个笑话"),
                "",
                &snapshot,
                Duration::from_millis(300),
            )
            .await;

        assert!(result.is_err());
    }
}
