use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use civic_common::types::{Channel, Recipient};

use crate::ChannelSender;
use crate::outcome::SendOutcome;

/// Bounds every send of the wrapped sender. An elapsed send becomes a failed
/// outcome instead of hanging the caller.
pub struct TimedSender {
    inner: Arc<dyn ChannelSender>,
    timeout: Duration,
}

impl TimedSender {
    pub fn new(inner: Arc<dyn ChannelSender>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl ChannelSender for TimedSender {
    fn channel(&self) -> Channel {
        self.inner.channel()
    }

    async fn send(
        &self,
        recipient: &Recipient,
        subject: Option<&str>,
        message: &str,
    ) -> SendOutcome {
        match tokio::time::timeout(self.timeout, self.inner.send(recipient, subject, message))
            .await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::debug!(
                    channel = %self.inner.channel(),
                    recipient_id = recipient.id,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Send timed out"
                );
                SendOutcome::failed(format!("send timed out after {:?}", self.timeout))
            }
        }
    }
}
