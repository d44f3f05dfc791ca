//! Dispatch orchestrator: validates a batch, then for each recipient:
//!
//! 1. Creates a `Pending` ledger row
//! 2. Waits on the shared throttle
//! 3. Sends through the channel's sender, each gateway leg bounded by the
//!    send timeout
//! 4. Records `Sent` or `Failed`, auditing successful sends
//!
//! One recipient's failure never stops the batch.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use uuid::Uuid;

use civic_common::config::AppConfig;
use civic_common::error::AppError;
use civic_common::types::{
    BatchResult, Channel, NewNotification, NotificationStatus, Recipient, RecipientType,
};
use civic_notifier::phone::normalize_phone;
use civic_notifier::ChannelRouter;

use crate::audit::{AuditEntry, AuditSink};
use crate::ledger::NotificationLedger;
use crate::throttle::Throttle;

/// Orchestrator tuning.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Hard ceiling on recipients per batch.
    pub batch_ceiling: usize,
    /// Upper bound on a single channel send.
    pub send_timeout: Duration,
    /// Recipients in flight at once.
    pub concurrency: usize,
    /// Country code used to normalize phones for duplicate detection.
    pub country_code: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            batch_ceiling: 500,
            send_timeout: Duration::from_secs(10),
            concurrency: 1,
            country_code: "233".to_string(),
        }
    }
}

impl From<&AppConfig> for DispatchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            batch_ceiling: config.dispatch_batch_ceiling,
            send_timeout: Duration::from_secs(config.dispatch_send_timeout_secs),
            concurrency: config.dispatch_concurrency.max(1),
            country_code: config.sms_country_code.clone(),
        }
    }
}

/// What to send, on which channel, on whose behalf.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub channel: Channel,
    pub subject: Option<String>,
    pub message: String,
    pub sent_by: i64,
}

impl DispatchRequest {
    fn subject(&self) -> Option<&str> {
        self.subject.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

/// Identity used to spot the same contact twice in one batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ContactKey {
    Phone(String),
    Entity(RecipientType, i64),
}

pub struct Dispatcher {
    router: ChannelRouter,
    ledger: Arc<dyn NotificationLedger>,
    audit: Arc<dyn AuditSink>,
    throttle: Arc<dyn Throttle>,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(
        router: ChannelRouter,
        ledger: Arc<dyn NotificationLedger>,
        audit: Arc<dyn AuditSink>,
        throttle: Arc<dyn Throttle>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            router: router.with_send_timeout(config.send_timeout),
            ledger,
            audit,
            throttle,
            config,
        }
    }

    /// Reject a batch before any side effect.
    pub fn validate(
        &self,
        request: &DispatchRequest,
        recipient_count: usize,
    ) -> Result<(), AppError> {
        if request.message.trim().is_empty() {
            return Err(AppError::Validation("message is required".to_string()));
        }
        if recipient_count == 0 {
            return Err(AppError::Validation("no recipients".to_string()));
        }
        if recipient_count > self.config.batch_ceiling {
            return Err(AppError::Validation(format!(
                "batch too large: {} recipients exceeds the limit of {}",
                recipient_count, self.config.batch_ceiling
            )));
        }
        Ok(())
    }

    /// Run one batch against an already-resolved recipient list.
    ///
    /// Returns `Err` only for validation failures. Everything that goes wrong
    /// per recipient is folded into the counts.
    pub async fn dispatch(
        &self,
        request: &DispatchRequest,
        recipients: Vec<Recipient>,
    ) -> Result<BatchResult, AppError> {
        self.validate(request, recipients.len())?;

        let batch_id = Uuid::new_v4();
        let total = recipients.len();

        tracing::info!(
            batch_id = %batch_id,
            channel = %request.channel,
            recipients = total,
            sent_by = request.sent_by,
            "Dispatch started"
        );

        let (deliverable, skipped_count) =
            partition_duplicates(request.channel, recipients, &self.config.country_code);

        let delivered: Vec<bool> = futures::stream::iter(deliverable)
            .map(|recipient| self.deliver_one(batch_id, request, recipient))
            .buffered(self.config.concurrency.max(1))
            .collect()
            .await;

        let success_count = delivered.iter().filter(|sent| **sent).count();
        let result = BatchResult {
            success_count,
            failure_count: delivered.len() - success_count,
            skipped_count,
        };

        tracing::info!(
            batch_id = %batch_id,
            channel = %request.channel,
            sent = result.success_count,
            failed = result.failure_count,
            skipped = result.skipped_count,
            "Dispatch finished"
        );

        Ok(result)
    }

    /// Create, send and record one recipient. Returns whether it was sent.
    async fn deliver_one(
        &self,
        batch_id: Uuid,
        request: &DispatchRequest,
        recipient: Recipient,
    ) -> bool {
        let new_notification = NewNotification {
            batch_id,
            recipient_type: recipient.recipient_type,
            recipient_id: recipient.id,
            channel: request.channel,
            subject: request.subject().map(str::to_string),
            message: request.message.clone(),
            sent_by: request.sent_by,
        };

        let notification_id = match self.ledger.create(&new_notification).await {
            Ok(id) => id,
            Err(e) => {
                tracing::error!(
                    batch_id = %batch_id,
                    recipient_type = %recipient.recipient_type,
                    recipient_id = recipient.id,
                    error = %e,
                    "Failed to create notification record"
                );
                return false;
            }
        };

        self.throttle.acquire().await;

        let outcome = self
            .router
            .sender_for(request.channel)
            .send(&recipient, request.subject(), &request.message)
            .await;

        let recorded = if outcome.success {
            self.ledger
                .update_status(
                    notification_id,
                    NotificationStatus::Sent,
                    Some(Utc::now()),
                    None,
                )
                .await
        } else {
            tracing::warn!(
                notification_id,
                batch_id = %batch_id,
                channel = %request.channel,
                reason = outcome.reason(),
                "Notification delivery failed"
            );
            self.ledger
                .update_status(
                    notification_id,
                    NotificationStatus::Failed,
                    None,
                    Some(outcome.reason()),
                )
                .await
        };

        if let Err(e) = recorded {
            tracing::error!(
                notification_id,
                batch_id = %batch_id,
                error = %e,
                "Failed to record notification status"
            );
            return false;
        }

        if !outcome.success {
            return false;
        }

        tracing::info!(
            notification_id,
            batch_id = %batch_id,
            channel = %request.channel,
            recipient_type = %recipient.recipient_type,
            recipient_id = recipient.id,
            "Notification sent"
        );

        let entry = AuditEntry {
            actor_id: request.sent_by,
            action: "notification_sent",
            entity_type: "notification",
            entity_id: notification_id,
            old_value: None,
            new_value: Some(serde_json::json!({
                "channel": request.channel,
                "recipient_type": recipient.recipient_type,
                "recipient_id": recipient.id,
                "status": NotificationStatus::Sent,
            })),
        };
        if let Err(e) = self.audit.record(entry).await {
            tracing::warn!(notification_id, error = %e, "Failed to write audit entry");
        }

        true
    }
}

/// Drop recipients whose contact was already seen earlier in the batch.
///
/// Returns the recipients to deliver, in order, and the number skipped. A
/// recipient with no usable key is never skipped.
fn partition_duplicates(
    channel: Channel,
    recipients: Vec<Recipient>,
    country_code: &str,
) -> (Vec<Recipient>, usize) {
    let mut seen: HashSet<ContactKey> = HashSet::new();
    let mut deliverable = Vec::with_capacity(recipients.len());
    let mut skipped = 0;

    for recipient in recipients {
        let keys = contact_keys(channel, &recipient, country_code);
        if !keys.is_empty() && keys.iter().all(|key| seen.contains(key)) {
            tracing::debug!(
                recipient_type = %recipient.recipient_type,
                recipient_id = recipient.id,
                "Duplicate contact in batch, skipping"
            );
            skipped += 1;
            continue;
        }
        seen.extend(keys);
        deliverable.push(recipient);
    }

    (deliverable, skipped)
}

fn contact_keys(channel: Channel, recipient: &Recipient, country_code: &str) -> Vec<ContactKey> {
    // `+` numbers keep their separators after normalization; compare digits only.
    let phone = recipient.phone().map(|raw| {
        let normalized = normalize_phone(raw, country_code).unwrap_or_else(|_| raw.to_string());
        ContactKey::Phone(
            normalized
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '+')
                .collect(),
        )
    });
    // Ad-hoc recipients have no entity, only their phone.
    let entity = if recipient.id == 0 {
        phone.clone()
    } else {
        Some(ContactKey::Entity(recipient.recipient_type, recipient.id))
    };

    match channel {
        Channel::Sms => phone.into_iter().collect(),
        Channel::Push | Channel::System => entity.into_iter().collect(),
        Channel::All => entity.into_iter().chain(phone).collect(),
    }
}
