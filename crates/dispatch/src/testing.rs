//! In-memory doubles for unit tests.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use civic_common::error::AppError;
use civic_common::types::{
    Channel, NewNotification, Notification, NotificationStatus, Recipient, RecipientType,
};
use civic_notifier::{ChannelSender, SendOutcome};

use crate::audit::{AuditEntry, AuditSink};
use crate::ledger::{NotificationLedger, ensure_dispatch_transition};
use crate::resolver::{Criterion, RecipientSource};

pub fn business(id: i64, name: &str) -> Recipient {
    Recipient {
        id,
        recipient_type: RecipientType::Business,
        display_name: name.to_string(),
        phone: Some(format!("024{:07}", id)),
    }
}

pub fn property(id: i64, name: &str) -> Recipient {
    Recipient {
        id,
        recipient_type: RecipientType::Property,
        display_name: name.to_string(),
        phone: Some(format!("020{:07}", id)),
    }
}

pub fn without_phone(mut recipient: Recipient) -> Recipient {
    recipient.phone = None;
    recipient
}

pub fn with_phone(mut recipient: Recipient, phone: &str) -> Recipient {
    recipient.phone = Some(phone.to_string());
    recipient
}

/// Recipient source over a fixed list. Every criterion matches everything.
pub struct MemorySource {
    recipients: Vec<Recipient>,
    fail: bool,
    honor_limit: bool,
}

impl MemorySource {
    pub fn new(recipients: Vec<Recipient>) -> Self {
        Self {
            recipients,
            fail: false,
            honor_limit: true,
        }
    }

    pub fn failing() -> Self {
        Self {
            recipients: Vec::new(),
            fail: true,
            honor_limit: true,
        }
    }

    /// Returns every recipient even past the requested limit.
    pub fn ignoring_limit(recipients: Vec<Recipient>) -> Self {
        Self {
            recipients,
            fail: false,
            honor_limit: false,
        }
    }
}

#[async_trait]
impl RecipientSource for MemorySource {
    async fn fetch(&self, _criterion: Criterion, limit: usize) -> Result<Vec<Recipient>, AppError> {
        if self.fail {
            return Err(AppError::Internal("store offline".to_string()));
        }
        let mut recipients = self.recipients.clone();
        if self.honor_limit {
            recipients.truncate(limit);
        }
        Ok(recipients)
    }

    async fn find(
        &self,
        recipient_type: RecipientType,
        id: i64,
    ) -> Result<Option<Recipient>, AppError> {
        if self.fail {
            return Err(AppError::Internal("store offline".to_string()));
        }
        Ok(self
            .recipients
            .iter()
            .find(|r| r.recipient_type == recipient_type && r.id == id)
            .cloned())
    }
}

/// Ledger kept in a vector. Enforces the same lifecycle as `PgLedger`.
#[derive(Default)]
pub struct MemoryLedger {
    rows: Mutex<Vec<Notification>>,
    fail_create: bool,
    fail_update: bool,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_create() -> Self {
        Self {
            fail_create: true,
            ..Self::default()
        }
    }

    pub fn failing_update() -> Self {
        Self {
            fail_update: true,
            ..Self::default()
        }
    }

    pub fn rows(&self) -> Vec<Notification> {
        self.rows.lock().unwrap().clone()
    }

    pub fn count_with(&self, status: NotificationStatus) -> usize {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.status == status)
            .count()
    }
}

#[async_trait]
impl NotificationLedger for MemoryLedger {
    async fn create(&self, notification: &NewNotification) -> Result<i64, AppError> {
        if self.fail_create {
            return Err(AppError::Internal("insert rejected".to_string()));
        }
        let mut rows = self.rows.lock().unwrap();
        let id = rows.len() as i64 + 1;
        rows.push(Notification {
            id,
            batch_id: Some(notification.batch_id),
            recipient_type: notification.recipient_type,
            recipient_id: notification.recipient_id,
            channel: notification.channel,
            subject: notification.subject.clone(),
            message: notification.message.clone(),
            status: NotificationStatus::Pending,
            error_detail: None,
            sent_by: notification.sent_by,
            created_at: Utc::now(),
            sent_at: None,
            read_at: None,
        });
        Ok(id)
    }

    async fn update_status(
        &self,
        id: i64,
        status: NotificationStatus,
        sent_at: Option<DateTime<Utc>>,
        error_detail: Option<&str>,
    ) -> Result<(), AppError> {
        ensure_dispatch_transition(status)?;
        if self.fail_update {
            return Err(AppError::Internal("update rejected".to_string()));
        }
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|n| n.id == id && n.status == NotificationStatus::Pending)
            .ok_or_else(|| AppError::Conflict(format!("Notification {} not pending", id)))?;
        row.status = status;
        row.sent_at = sent_at;
        row.error_detail = error_detail.map(str::to_string);
        Ok(())
    }

    async fn get(&self, id: i64) -> Result<Option<Notification>, AppError> {
        Ok(self.rows.lock().unwrap().iter().find(|n| n.id == id).cloned())
    }

    async fn list_for_recipient(
        &self,
        recipient_type: RecipientType,
        recipient_id: i64,
        limit: i64,
    ) -> Result<Vec<Notification>, AppError> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .iter()
            .rev()
            .filter(|n| n.recipient_type == recipient_type && n.recipient_id == recipient_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn mark_read(&self, id: i64) -> Result<bool, AppError> {
        let mut rows = self.rows.lock().unwrap();
        match rows.iter_mut().find(|n| n.id == id) {
            Some(row) if row.status.can_transition_to(NotificationStatus::Read) => {
                row.status = NotificationStatus::Read;
                row.read_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[derive(Default)]
pub struct MemoryAudit {
    entries: Mutex<Vec<AuditEntry>>,
    fail: bool,
}

impl MemoryAudit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAudit {
    async fn record(&self, entry: AuditEntry) -> Result<(), AppError> {
        if self.fail {
            return Err(AppError::Internal("audit store offline".to_string()));
        }
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }
}

/// Sender whose outcome is decided by a closure over the recipient.
pub struct ScriptedSender {
    channel: Channel,
    delay: Duration,
    script: Box<dyn Fn(&Recipient) -> SendOutcome + Send + Sync>,
    calls: Mutex<Vec<i64>>,
}

impl ScriptedSender {
    pub fn new(
        channel: Channel,
        script: impl Fn(&Recipient) -> SendOutcome + Send + Sync + 'static,
    ) -> Self {
        Self {
            channel,
            delay: Duration::ZERO,
            script: Box::new(script),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn succeeding(channel: Channel) -> Self {
        Self::new(channel, |_| SendOutcome::ok())
    }

    pub fn failing(channel: Channel, reason: &'static str) -> Self {
        Self::new(channel, move |_| SendOutcome::failed(reason))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Recipient ids this sender was invoked for, in call order.
    pub fn calls(&self) -> Vec<i64> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChannelSender for ScriptedSender {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn send(
        &self,
        recipient: &Recipient,
        _subject: Option<&str>,
        _message: &str,
    ) -> SendOutcome {
        self.calls.lock().unwrap().push(recipient.id);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        (self.script)(recipient)
    }
}
