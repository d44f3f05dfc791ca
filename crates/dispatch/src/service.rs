//! Operator-facing notification service: resolve, then dispatch.

use std::sync::Arc;
use std::time::Duration;

use redis::aio::ConnectionManager;
use serde::Deserialize;
use sqlx::PgPool;

use civic_common::config::{AppConfig, ThrottleBackend};
use civic_common::error::AppError;
use civic_common::types::{BatchResult, Notification, Recipient, RecipientType};
use civic_notifier::ChannelRouter;

use crate::audit::{AuditEntry, AuditSink, PgAuditSink};
use crate::ledger::{NotificationLedger, PgLedger};
use crate::orchestrator::{DispatchConfig, DispatchRequest, Dispatcher};
use crate::resolver::{CriterionParams, PgRecipientSource, RecipientResolver};
use crate::throttle::{IntervalThrottle, RedisThrottle, Throttle};

const THROTTLE_KEY: &str = "civic:dispatch:throttle";

/// Target of an individual send.
///
/// `recipient_id == 0` addresses `phone` directly without a registry lookup.
#[derive(Debug, Clone, Deserialize)]
pub struct IndividualTarget {
    pub recipient_type: RecipientType,
    pub recipient_id: i64,
    #[serde(default)]
    pub phone: Option<String>,
}

pub struct NotificationService {
    resolver: RecipientResolver,
    dispatcher: Dispatcher,
    ledger: Arc<dyn NotificationLedger>,
    audit: Arc<dyn AuditSink>,
}

impl NotificationService {
    pub fn new(
        resolver: RecipientResolver,
        dispatcher: Dispatcher,
        ledger: Arc<dyn NotificationLedger>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            resolver,
            dispatcher,
            ledger,
            audit,
        }
    }

    /// Wire the service against PostgreSQL, with the throttle backend chosen
    /// by configuration. `redis` is required only for the Redis backend.
    pub fn postgres(
        pool: PgPool,
        redis: Option<ConnectionManager>,
        config: &AppConfig,
    ) -> anyhow::Result<Self> {
        let interval = Duration::from_millis(config.dispatch_send_interval_ms);
        let throttle: Arc<dyn Throttle> = match (config.dispatch_throttle, redis) {
            (ThrottleBackend::Redis, Some(redis)) => {
                Arc::new(RedisThrottle::new(redis, THROTTLE_KEY, interval))
            }
            (ThrottleBackend::Redis, None) => {
                anyhow::bail!("DISPATCH_THROTTLE=redis requires a Redis connection")
            }
            (ThrottleBackend::Memory, _) => Arc::new(IntervalThrottle::new(interval)),
        };

        let ledger: Arc<dyn NotificationLedger> = Arc::new(PgLedger::new(pool.clone()));
        let audit: Arc<dyn AuditSink> = Arc::new(PgAuditSink::new(pool.clone()));
        let resolver = RecipientResolver::new(Arc::new(PgRecipientSource::new(pool)));
        let dispatcher = Dispatcher::new(
            ChannelRouter::from_config(config)?,
            ledger.clone(),
            audit.clone(),
            throttle,
            DispatchConfig::from(config),
        );

        Ok(Self::new(resolver, dispatcher, ledger, audit))
    }

    /// Resolve a criterion without sending anything.
    pub async fn preview(&self, criterion: &str, params: &CriterionParams) -> Vec<Recipient> {
        self.resolver.resolve(criterion, params).await
    }

    pub async fn send_bulk(
        &self,
        criterion: &str,
        params: &CriterionParams,
        request: &DispatchRequest,
    ) -> Result<BatchResult, AppError> {
        // Fail message validation before touching the registry.
        self.dispatcher.validate(request, 1)?;

        let recipients = self.resolver.resolve(criterion, params).await;
        if recipients.is_empty() {
            return Err(AppError::Validation("no recipients".to_string()));
        }

        self.dispatcher.dispatch(request, recipients).await
    }

    pub async fn send_individual(
        &self,
        target: &IndividualTarget,
        request: &DispatchRequest,
    ) -> Result<BatchResult, AppError> {
        let recipient = if target.recipient_id == 0 {
            let phone = target
                .phone
                .as_deref()
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .ok_or_else(|| {
                    AppError::Validation("phone is required for an ad-hoc recipient".to_string())
                })?;
            Recipient::ad_hoc(target.recipient_type, phone)
        } else {
            self.resolver
                .find(target.recipient_type, target.recipient_id)
                .await?
                .ok_or_else(|| {
                    AppError::NotFound(format!(
                        "{} {} not found",
                        target.recipient_type, target.recipient_id
                    ))
                })?
        };

        self.dispatcher.dispatch(request, vec![recipient]).await
    }

    /// Manual `Sent`/`Failed` → `Read` transition.
    pub async fn mark_read(&self, id: i64, operator_id: i64) -> Result<Notification, AppError> {
        let current = self.get(id).await?;

        if !self.ledger.mark_read(id).await? {
            return Err(AppError::Conflict(format!(
                "Notification {} is '{}' and cannot be marked read",
                id, current.status
            )));
        }

        let updated = self.get(id).await?;

        let entry = AuditEntry {
            actor_id: operator_id,
            action: "notification_read",
            entity_type: "notification",
            entity_id: id,
            old_value: Some(serde_json::json!({ "status": current.status })),
            new_value: Some(serde_json::json!({ "status": updated.status })),
        };
        if let Err(e) = self.audit.record(entry).await {
            tracing::warn!(notification_id = id, error = %e, "Failed to write audit entry");
        }

        Ok(updated)
    }

    pub async fn get(&self, id: i64) -> Result<Notification, AppError> {
        self.ledger
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Notification {} not found", id)))
    }

    /// Recent notifications for one recipient, newest first.
    pub async fn history(
        &self,
        recipient_type: RecipientType,
        recipient_id: i64,
        limit: i64,
    ) -> Result<Vec<Notification>, AppError> {
        self.ledger
            .list_for_recipient(recipient_type, recipient_id, limit)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryAudit, MemoryLedger, MemorySource, ScriptedSender, business};
    use civic_common::types::{Channel, NotificationStatus};

    struct Harness {
        service: NotificationService,
        ledger: Arc<MemoryLedger>,
        audit: Arc<MemoryAudit>,
        sms: Arc<ScriptedSender>,
    }

    fn harness(source: MemorySource) -> Harness {
        let ledger = Arc::new(MemoryLedger::new());
        let audit = Arc::new(MemoryAudit::new());
        let sms = Arc::new(ScriptedSender::succeeding(Channel::Sms));
        let dispatcher = Dispatcher::new(
            ChannelRouter::new(
                Arc::new(ScriptedSender::failing(Channel::Push, "no registered device token")),
                sms.clone(),
            ),
            ledger.clone(),
            audit.clone(),
            Arc::new(IntervalThrottle::new(Duration::ZERO)),
            DispatchConfig::default(),
        );
        let service = NotificationService::new(
            RecipientResolver::new(Arc::new(source)),
            dispatcher,
            ledger.clone(),
            audit.clone(),
        );
        Harness {
            service,
            ledger,
            audit,
            sms,
        }
    }

    fn request(channel: Channel) -> DispatchRequest {
        DispatchRequest {
            channel,
            subject: Some("Business Operating Permit".to_string()),
            message: "Your permit fee is due".to_string(),
            sent_by: 3,
        }
    }

    fn three_businesses() -> MemorySource {
        MemorySource::new(vec![
            business(1, "Asante Motors"),
            business(2, "Bekwai Bakery"),
            business(3, "Cocoa House"),
        ])
    }

    #[tokio::test]
    async fn test_send_bulk_system() {
        let h = harness(three_businesses());

        let result = h
            .service
            .send_bulk(
                "all_businesses",
                &CriterionParams::default(),
                &request(Channel::System),
            )
            .await
            .unwrap();

        assert_eq!(result.summary(), "3 sent, 0 failed, 0 skipped");
        assert_eq!(h.ledger.count_with(NotificationStatus::Sent), 3);
    }

    #[tokio::test]
    async fn test_empty_zone_preview_and_send() {
        let h = harness(MemorySource::new(Vec::new()));
        let params = CriterionParams {
            zone_id: Some(12),
            business_type_id: None,
        };

        assert!(h.service.preview("zone", &params).await.is_empty());

        let err = h
            .service
            .send_bulk("zone", &params, &request(Channel::Sms))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m == "no recipients"));
        assert!(h.ledger.rows().is_empty());
    }

    #[tokio::test]
    async fn test_send_bulk_rejects_blank_message_first() {
        let h = harness(three_businesses());
        let mut req = request(Channel::System);
        req.message = "".to_string();

        let err = h
            .service
            .send_bulk("all_businesses", &CriterionParams::default(), &req)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m == "message is required"));
    }

    #[tokio::test]
    async fn test_send_individual_registry_entity() {
        let h = harness(three_businesses());
        let target = IndividualTarget {
            recipient_type: RecipientType::Business,
            recipient_id: 2,
            phone: None,
        };

        let result = h
            .service
            .send_individual(&target, &request(Channel::Sms))
            .await
            .unwrap();

        assert_eq!(result.success_count, 1);
        assert_eq!(h.sms.calls(), vec![2]);
    }

    #[tokio::test]
    async fn test_send_individual_unknown_is_not_found() {
        let h = harness(three_businesses());
        let target = IndividualTarget {
            recipient_type: RecipientType::Property,
            recipient_id: 99,
            phone: None,
        };

        let err = h
            .service
            .send_individual(&target, &request(Channel::Sms))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(h.ledger.rows().is_empty());
    }

    #[tokio::test]
    async fn test_send_individual_ad_hoc_phone() {
        let h = harness(MemorySource::new(Vec::new()));
        let target = IndividualTarget {
            recipient_type: RecipientType::User,
            recipient_id: 0,
            phone: Some("0277000111".to_string()),
        };

        let result = h
            .service
            .send_individual(&target, &request(Channel::Sms))
            .await
            .unwrap();

        assert_eq!(result.success_count, 1);
        let row = &h.ledger.rows()[0];
        assert_eq!(row.recipient_id, 0);
        assert_eq!(row.recipient_type, RecipientType::User);
    }

    #[tokio::test]
    async fn test_send_individual_ad_hoc_requires_phone() {
        let h = harness(MemorySource::new(Vec::new()));
        let target = IndividualTarget {
            recipient_type: RecipientType::User,
            recipient_id: 0,
            phone: Some("  ".to_string()),
        };

        let err = h
            .service
            .send_individual(&target, &request(Channel::Sms))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_mark_read_lifecycle() {
        let h = harness(three_businesses());
        h.service
            .send_bulk(
                "all_businesses",
                &CriterionParams::default(),
                &request(Channel::Push),
            )
            .await
            .unwrap();
        let id = h.ledger.rows()[0].id;
        assert_eq!(h.ledger.rows()[0].status, NotificationStatus::Failed);

        let read = h.service.mark_read(id, 3).await.unwrap();
        assert_eq!(read.status, NotificationStatus::Read);
        assert!(read.read_at.is_some());

        let audit = h.audit.entries();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].action, "notification_read");

        let err = h.service.mark_read(id, 3).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let err = h.service.mark_read(404, 3).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_history_newest_first() {
        let h = harness(three_businesses());
        let target = IndividualTarget {
            recipient_type: RecipientType::Business,
            recipient_id: 1,
            phone: None,
        };
        for _ in 0..3 {
            h.service
                .send_individual(&target, &request(Channel::System))
                .await
                .unwrap();
        }

        let history = h
            .service
            .history(RecipientType::Business, 1, 2)
            .await
            .unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[0].id > history[1].id);
    }
}
