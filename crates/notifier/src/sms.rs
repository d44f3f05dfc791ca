//! SMS channel: text message to the recipient's phone on file.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use civic_common::types::{Channel, Recipient};

use crate::ChannelSender;
use crate::outcome::SendOutcome;
use crate::phone::{PhoneError, normalize_phone};

/// SMS carrier collaborator. `phone` is already normalized.
#[async_trait]
pub trait SmsGateway: Send + Sync {
    async fn send(&self, phone: &str, body: &str) -> SendOutcome;
}

#[derive(Debug, Serialize)]
struct SmsRequest<'a> {
    to: &'a str,
    from: &'a str,
    body: &'a str,
}

/// Carrier gateway reached over HTTP.
pub struct HttpSmsGateway {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    sender_id: String,
}

impl HttpSmsGateway {
    pub fn new(
        url: String,
        api_key: Option<String>,
        sender_id: String,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url,
            api_key,
            sender_id,
        })
    }
}

#[async_trait]
impl SmsGateway for HttpSmsGateway {
    async fn send(&self, phone: &str, body: &str) -> SendOutcome {
        let request = SmsRequest {
            to: phone,
            from: &self.sender_id,
            body,
        };

        let mut builder = self.client.post(&self.url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        match builder.send().await {
            Ok(response) if response.status().is_success() => SendOutcome::ok(),
            Ok(response) => {
                let status = response.status();
                let text = response.text().await.unwrap_or_default();
                SendOutcome::failed(format!("sms gateway returned {}: {}", status, text))
            }
            Err(e) => SendOutcome::failed(format!("sms request failed: {}", e)),
        }
    }
}

/// Gateway that only logs the message. Used when no carrier is configured.
pub struct SimulatedSmsGateway;

#[async_trait]
impl SmsGateway for SimulatedSmsGateway {
    async fn send(&self, phone: &str, body: &str) -> SendOutcome {
        tracing::info!(
            phone = %phone,
            length = body.chars().count(),
            "Simulated SMS delivery"
        );
        SendOutcome::ok()
    }
}

/// SMS channel sender.
pub struct SmsSender {
    gateway: Arc<dyn SmsGateway>,
    country_code: String,
}

impl SmsSender {
    pub fn new(gateway: Arc<dyn SmsGateway>, country_code: impl Into<String>) -> Self {
        Self {
            gateway,
            country_code: country_code.into(),
        }
    }

    /// Text actually handed to the carrier.
    pub fn compose_body(subject: Option<&str>, message: &str) -> String {
        match subject.map(str::trim).filter(|s| !s.is_empty()) {
            Some(subject) => format!("{}: {}", subject, message),
            None => message.to_string(),
        }
    }
}

#[async_trait]
impl ChannelSender for SmsSender {
    fn channel(&self) -> Channel {
        Channel::Sms
    }

    async fn send(
        &self,
        recipient: &Recipient,
        subject: Option<&str>,
        message: &str,
    ) -> SendOutcome {
        let Some(raw) = recipient.phone() else {
            return SendOutcome::failed(PhoneError::Missing.to_string());
        };

        let phone = match normalize_phone(raw, &self.country_code) {
            Ok(phone) => phone,
            Err(e) => return SendOutcome::failed(e.to_string()),
        };

        let body = Self::compose_body(subject, message);
        self.gateway.send(&phone, &body).await
    }
}
