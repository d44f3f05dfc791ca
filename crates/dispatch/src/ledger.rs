//! Notification ledger: one durable row per recipient per dispatch attempt.
//!
//! The orchestrator writes through `create` and `update_status`; the query
//! helpers back the operator history views.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use civic_common::error::AppError;
use civic_common::types::{NewNotification, Notification, NotificationStatus, RecipientType};

#[async_trait]
pub trait NotificationLedger: Send + Sync {
    /// Insert a `Pending` row and return its id.
    async fn create(&self, notification: &NewNotification) -> Result<i64, AppError>;

    /// Move a `Pending` row to `Sent` or `Failed`.
    ///
    /// Fails with `Conflict` if the row is no longer pending.
    async fn update_status(
        &self,
        id: i64,
        status: NotificationStatus,
        sent_at: Option<DateTime<Utc>>,
        error_detail: Option<&str>,
    ) -> Result<(), AppError>;

    async fn get(&self, id: i64) -> Result<Option<Notification>, AppError>;

    /// Most recent rows addressed to one recipient, newest first.
    async fn list_for_recipient(
        &self,
        recipient_type: RecipientType,
        recipient_id: i64,
        limit: i64,
    ) -> Result<Vec<Notification>, AppError>;

    /// Manual `Sent`/`Failed` → `Read` transition. Returns whether a row changed.
    async fn mark_read(&self, id: i64) -> Result<bool, AppError>;
}

/// Reject automatic transitions other than `Pending` → `Sent`/`Failed`.
pub(crate) fn ensure_dispatch_transition(status: NotificationStatus) -> Result<(), AppError> {
    if NotificationStatus::Pending.can_transition_to(status) {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "Dispatch cannot move a notification to '{}'",
            status
        )))
    }
}

/// PostgreSQL-backed ledger on the `notifications` table.
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationLedger for PgLedger {
    async fn create(&self, notification: &NewNotification) -> Result<i64, AppError> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO notifications
                (batch_id, recipient_type, recipient_id, channel, subject, message, status, sent_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(notification.batch_id)
        .bind(notification.recipient_type.to_string())
        .bind(notification.recipient_id)
        .bind(notification.channel.to_string())
        .bind(&notification.subject)
        .bind(&notification.message)
        .bind(NotificationStatus::Pending.to_string())
        .bind(notification.sent_by)
        .fetch_one(&self.pool)
        .await?;

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

        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET status = $1, sent_at = $2, error_detail = $3
            WHERE id = $4 AND status = 'pending'
            "#,
        )
        .bind(status.to_string())
        .bind(sent_at)
        .bind(error_detail)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::Conflict(format!(
                "Notification {} is missing or no longer pending",
                id
            )));
        }

        Ok(())
    }

    async fn get(&self, id: i64) -> Result<Option<Notification>, AppError> {
        let notification: Option<Notification> =
            sqlx::query_as("SELECT * FROM notifications WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(notification)
    }

    async fn list_for_recipient(
        &self,
        recipient_type: RecipientType,
        recipient_id: i64,
        limit: i64,
    ) -> Result<Vec<Notification>, AppError> {
        let notifications: Vec<Notification> = sqlx::query_as(
            r#"
            SELECT * FROM notifications
            WHERE recipient_type = $1 AND recipient_id = $2
            ORDER BY created_at DESC, id DESC
            LIMIT $3
            "#,
        )
        .bind(recipient_type.to_string())
        .bind(recipient_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(notifications)
    }

    async fn mark_read(&self, id: i64) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET status = 'read', read_at = NOW()
            WHERE id = $1 AND status IN ('sent', 'failed')
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
