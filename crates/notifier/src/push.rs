//! Push channel: delivery to the recipient's registered mobile devices.
//!
//! The gateway owns device-token lookup and is keyed by recipient identity.
//! It reports one outcome per device; the sender succeeds if any device did.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use civic_common::error::AppError;
use civic_common::types::{Channel, Recipient, RecipientType};

use crate::ChannelSender;
use crate::outcome::{SendOutcome, any_succeeded};

/// Title used when the operator leaves the subject blank.
const DEFAULT_PUSH_TITLE: &str = "Notification";

/// Push-notification gateway collaborator.
#[async_trait]
pub trait PushGateway: Send + Sync {
    /// Deliver to every device registered for the recipient.
    ///
    /// Returns one outcome per device; an empty list means no devices.
    async fn send_to_recipient(
        &self,
        recipient_type: RecipientType,
        recipient_id: i64,
        title: &str,
        body: &str,
        data: serde_json::Value,
    ) -> Result<Vec<SendOutcome>, AppError>;
}

/// Request body sent to the push service.
#[derive(Debug, Serialize)]
struct PushRequest<'a> {
    recipient_type: RecipientType,
    recipient_id: i64,
    title: &'a str,
    body: &'a str,
    data: serde_json::Value,
}

/// Response body from the push service.
#[derive(Debug, Deserialize)]
struct PushResponse {
    #[serde(default)]
    results: Vec<SendOutcome>,
}

/// Push gateway backed by an HTTP push service.
pub struct HttpPushGateway {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl HttpPushGateway {
    pub fn new(url: String, api_key: Option<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url,
            api_key,
        })
    }
}

#[async_trait]
impl PushGateway for HttpPushGateway {
    async fn send_to_recipient(
        &self,
        recipient_type: RecipientType,
        recipient_id: i64,
        title: &str,
        body: &str,
        data: serde_json::Value,
    ) -> Result<Vec<SendOutcome>, AppError> {
        let request = PushRequest {
            recipient_type,
            recipient_id,
            title,
            body,
            data,
        };

        let mut builder = self.client.post(&self.url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| AppError::Gateway(format!("push request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::Gateway(format!(
                "push gateway returned {}: {}",
                status, text
            )));
        }

        let parsed: PushResponse = response
            .json()
            .await
            .map_err(|e| AppError::Gateway(format!("invalid push gateway response: {}", e)))?;

        Ok(parsed.results)
    }
}

/// Stand-in used when no push service is configured.
pub struct DisabledPushGateway;

#[async_trait]
impl PushGateway for DisabledPushGateway {
    async fn send_to_recipient(
        &self,
        _recipient_type: RecipientType,
        _recipient_id: i64,
        _title: &str,
        _body: &str,
        _data: serde_json::Value,
    ) -> Result<Vec<SendOutcome>, AppError> {
        Err(AppError::Config("push gateway not configured".to_string()))
    }
}

/// Push channel sender.
pub struct PushSender {
    gateway: Arc<dyn PushGateway>,
}

impl PushSender {
    pub fn new(gateway: Arc<dyn PushGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl ChannelSender for PushSender {
    fn channel(&self) -> Channel {
        Channel::Push
    }

    async fn send(
        &self,
        recipient: &Recipient,
        subject: Option<&str>,
        message: &str,
    ) -> SendOutcome {
        let title = subject
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_PUSH_TITLE);
        let data = serde_json::json!({
            "recipient_type": recipient.recipient_type,
            "recipient_id": recipient.id,
        });

        let device_outcomes = match self
            .gateway
            .send_to_recipient(recipient.recipient_type, recipient.id, title, message, data)
            .await
        {
            Ok(outcomes) => outcomes,
            Err(AppError::Config(msg)) | Err(AppError::Gateway(msg)) => {
                return SendOutcome::failed(msg);
            }
            Err(e) => return SendOutcome::failed(e.to_string()),
        };

        if device_outcomes.is_empty() {
            return SendOutcome::failed("no registered device token");
        }

        let devices = device_outcomes.len();
        let outcome = any_succeeded(device_outcomes);

        tracing::debug!(
            recipient_type = %recipient.recipient_type,
            recipient_id = recipient.id,
            devices,
            success = outcome.success,
            "Push delivery attempted"
        );

        outcome
    }
}
