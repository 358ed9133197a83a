//! HTTP-backed adapters
//!
//! Thin clients for the external gateways: a Home-Assistant style smart-home
//! bridge, a SIP calling gateway, and an SMS/email notification gateway.
//! Status mapping is shared: 429 and 5xx are transient, auth failures and
//! other 4xx are permanent.

use async_trait::async_trait;
use serde::Deserialize;
use tokio::time::Instant;
use uuid::Uuid;

use companion_core::AdapterError;
use companion_policy::ContactRung;

use crate::traits::{
    NotificationAdapter, NotifyChannel, PlaceOutcome, SmartHomeAdapter, VoiceCallAdapter,
};

fn classify_status(status: reqwest::StatusCode) -> AdapterError {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        AdapterError::Transient(format!("gateway returned {}", status))
    } else if status == reqwest::StatusCode::UNAUTHORIZED
        || status == reqwest::StatusCode::FORBIDDEN
    {
        AdapterError::Permanent(format!("gateway auth failure {}", status))
    } else {
        AdapterError::Permanent(format!("gateway returned {}", status))
    }
}

fn classify_transport(error: reqwest::Error) -> AdapterError {
    if error.is_timeout() || error.is_connect() {
        AdapterError::Transient(error.to_string())
    } else {
        AdapterError::Permanent(error.to_string())
    }
}

fn remaining(deadline: Instant) -> Result<std::time::Duration, AdapterError> {
    let left = deadline.saturating_duration_since(Instant::now());
    if left.is_zero() {
        return Err(AdapterError::DeadlineExceeded);
    }
    Ok(left)
}

/// Smart-home bridge client.
pub struct HttpSmartHome {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpSmartHome {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            token: token.into(),
        }
    }
}

#[async_trait]
impl SmartHomeAdapter for HttpSmartHome {
    async fn apply(
        &self,
        device_id: &str,
        action: &str,
        params: &serde_json::Value,
        deadline: Instant,
    ) -> Result<(), AdapterError> {
        let timeout = remaining(deadline)?;

        let response = self
            .client
            .post(format!("{}/smart-home/cmd", self.base_url))
            .bearer_auth(&self.token)
            .timeout(timeout)
            .json(&serde_json::json!({
                "device": device_id,
                "action": action,
                "params": params,
            }))
            .send()
            .await
            .map_err(classify_transport)?;

        if !response.status().is_success() {
            return Err(classify_status(response.status()));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct PlaceResponse {
    status: PlaceOutcome,
}

/// SIP gateway client.
pub struct HttpVoiceCall {
    client: reqwest::Client,
    base_url: String,
}

impl HttpVoiceCall {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl VoiceCallAdapter for HttpVoiceCall {
    async fn place(
        &self,
        contact: &ContactRung,
        incident_id: Uuid,
        step_seq: u64,
        deadline: Instant,
    ) -> Result<PlaceOutcome, AdapterError> {
        let timeout = remaining(deadline)?;

        let response = self
            .client
            .post(format!("{}/sip/call", self.base_url))
            .timeout(timeout)
            .json(&serde_json::json!({
                "callee": contact.phone,
                "contact_id": contact.contact_id,
                "incident_id": incident_id.to_string(),
                "step_seq": step_seq,
            }))
            .send()
            .await
            .map_err(classify_transport)?;

        if !response.status().is_success() {
            return Err(classify_status(response.status()));
        }

        let body: PlaceResponse = response
            .json()
            .await
            .map_err(|e| AdapterError::Transient(e.to_string()))?;
        Ok(body.status)
    }
}

/// Notification gateway client.
pub struct HttpNotification {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpNotification {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl NotificationAdapter for HttpNotification {
    async fn send(
        &self,
        channel: NotifyChannel,
        recipient: &str,
        template_id: &str,
        fields: &serde_json::Value,
        deadline: Instant,
    ) -> Result<(), AdapterError> {
        let timeout = remaining(deadline)?;

        let response = self
            .client
            .post(format!("{}/notify", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(timeout)
            .json(&serde_json::json!({
                "channel": channel.as_str(),
                "recipient": recipient,
                "template_id": template_id,
                "fields": fields,
            }))
            .send()
            .await
            .map_err(classify_transport)?;

        if !response.status().is_success() {
            return Err(classify_status(response.status()));
        }
        Ok(())
    }
}
