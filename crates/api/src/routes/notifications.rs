//! Notification dispatch and ledger routes.

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use civic_common::error::AppError;
use civic_common::types::{BatchResult, Channel, Notification, Recipient, RecipientType};
use civic_dispatch::orchestrator::DispatchRequest;
use civic_dispatch::resolver::CriterionParams;
use civic_dispatch::service::IndividualTarget;

use crate::middleware::auth::AuthUser;
use crate::state::AppState;

const DEFAULT_HISTORY_LIMIT: i64 = 50;
const MAX_HISTORY_LIMIT: i64 = 100;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/notifications/preview", post(preview))
        .route("/api/notifications/send", post(send_bulk))
        .route("/api/notifications/send-individual", post(send_individual))
        .route("/api/notifications/{id}", get(get_notification))
        .route("/api/notifications/{id}/read", post(mark_read))
        .route(
            "/api/recipients/{recipient_type}/{recipient_id}/notifications",
            get(recipient_history),
        )
}

#[derive(Debug, Deserialize)]
pub struct PreviewBody {
    pub criterion: String,
    #[serde(flatten)]
    pub params: CriterionParams,
}

/// Channel and content shared by both send endpoints.
#[derive(Debug, Deserialize)]
pub struct MessageBody {
    pub channel: Channel,
    #[serde(default)]
    pub subject: Option<String>,
    pub message: String,
}

impl MessageBody {
    fn into_request(self, operator_id: i64) -> DispatchRequest {
        DispatchRequest {
            channel: self.channel,
            subject: self.subject,
            message: self.message,
            sent_by: operator_id,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SendBulkBody {
    pub criterion: String,
    #[serde(flatten)]
    pub params: CriterionParams,
    #[serde(flatten)]
    pub content: MessageBody,
}

#[derive(Debug, Deserialize)]
pub struct SendIndividualBody {
    #[serde(flatten)]
    pub target: IndividualTarget,
    #[serde(flatten)]
    pub content: MessageBody,
}

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub success_count: usize,
    pub failure_count: usize,
    pub skipped_count: usize,
    pub summary: String,
}

impl From<BatchResult> for BatchResponse {
    fn from(result: BatchResult) -> Self {
        Self {
            success_count: result.success_count,
            failure_count: result.failure_count,
            skipped_count: result.skipped_count,
            summary: result.summary(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

/// POST /api/notifications/preview: Resolve a criterion without sending.
async fn preview(
    State(state): State<AppState>,
    _auth: AuthUser,
    Json(body): Json<PreviewBody>,
) -> Json<Vec<Recipient>> {
    let recipients = state
        .notifications
        .preview(&body.criterion, &body.params)
        .await;
    Json(recipients)
}

/// POST /api/notifications/send: Resolve a criterion and dispatch to it.
async fn send_bulk(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<SendBulkBody>,
) -> Result<Json<BatchResponse>, AppError> {
    let request = body.content.into_request(auth.operator_id);
    let result = state
        .notifications
        .send_bulk(&body.criterion, &body.params, &request)
        .await?;
    Ok(Json(result.into()))
}

/// POST /api/notifications/send-individual: Send to one entity or phone.
async fn send_individual(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<SendIndividualBody>,
) -> Result<Json<BatchResponse>, AppError> {
    let request = body.content.into_request(auth.operator_id);
    let result = state
        .notifications
        .send_individual(&body.target, &request)
        .await?;
    Ok(Json(result.into()))
}

/// GET /api/notifications/:id: One ledger row.
async fn get_notification(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Notification>, AppError> {
    Ok(Json(state.notifications.get(id).await?))
}

/// POST /api/notifications/:id/read: Mark a sent or failed row as read.
async fn mark_read(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Notification>, AppError> {
    let notification = state
        .notifications
        .mark_read(id, auth.operator_id)
        .await?;
    Ok(Json(notification))
}

/// GET /api/recipients/:type/:id/notifications: Recent rows for a recipient.
async fn recipient_history(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path((recipient_type, recipient_id)): Path<(String, i64)>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<Notification>>, AppError> {
    let recipient_type: RecipientType = recipient_type.parse().map_err(AppError::Validation)?;
    let limit = history_limit(query.limit);

    let notifications = state
        .notifications
        .history(recipient_type, recipient_id, limit)
        .await?;
    Ok(Json(notifications))
}

fn history_limit(requested: Option<i64>) -> i64 {
    requested
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT)
}
