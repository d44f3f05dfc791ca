use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of registry entity a notification is addressed to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum RecipientType {
    Business,
    Property,
    User,
}

impl std::fmt::Display for RecipientType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecipientType::Business => write!(f, "business"),
            RecipientType::Property => write!(f, "property"),
            RecipientType::User => write!(f, "user"),
        }
    }
}

impl std::str::FromStr for RecipientType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "business" => Ok(RecipientType::Business),
            "property" => Ok(RecipientType::Property),
            "user" => Ok(RecipientType::User),
            other => Err(format!("Unknown recipient type '{}'", other)),
        }
    }
}

/// Delivery channel for a notification.
///
/// `All` attempts Push and SMS independently and succeeds if either does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum Channel {
    Push,
    Sms,
    System,
    All,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Push => write!(f, "push"),
            Channel::Sms => write!(f, "sms"),
            Channel::System => write!(f, "system"),
            Channel::All => write!(f, "all"),
        }
    }
}

/// Lifecycle status of a ledger row.
///
/// `Pending` → `Sent` | `Failed` happens once, automatically, during dispatch.
/// `Read` is a manual terminal transition from `Sent` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum NotificationStatus {
    Pending,
    Sent,
    Failed,
    Read,
}

impl NotificationStatus {
    /// Whether the lifecycle allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: NotificationStatus) -> bool {
        use NotificationStatus::*;
        matches!(
            (self, next),
            (Pending, Sent) | (Pending, Failed) | (Sent, Read) | (Failed, Read)
        )
    }
}

impl std::fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationStatus::Pending => write!(f, "pending"),
            NotificationStatus::Sent => write!(f, "sent"),
            NotificationStatus::Failed => write!(f, "failed"),
            NotificationStatus::Read => write!(f, "read"),
        }
    }
}

/// An addressable notification target, resolved fresh for every dispatch.
///
/// `id == 0` marks an ad-hoc phone number with no backing registry entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Recipient {
    pub id: i64,
    pub recipient_type: RecipientType,
    pub display_name: String,
    pub phone: Option<String>,
}

impl Recipient {
    /// Build a recipient for a phone number that has no registry entry.
    pub fn ad_hoc(recipient_type: RecipientType, phone: impl Into<String>) -> Self {
        let phone = phone.into();
        Self {
            id: 0,
            recipient_type,
            display_name: phone.clone(),
            phone: Some(phone),
        }
    }

    /// Phone on file, if it is non-blank.
    pub fn phone(&self) -> Option<&str> {
        self.phone
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }
}

/// A row of the notification ledger.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Notification {
    pub id: i64,
    pub batch_id: Option<Uuid>,
    pub recipient_type: RecipientType,
    pub recipient_id: i64,
    pub channel: Channel,
    pub subject: Option<String>,
    pub message: String,
    pub status: NotificationStatus,
    pub error_detail: Option<String>,
    pub sent_by: i64,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
}

/// Fields supplied when a ledger row is created. The row always starts `Pending`.
#[derive(Debug, Clone, Serialize)]
pub struct NewNotification {
    pub batch_id: Uuid,
    pub recipient_type: RecipientType,
    pub recipient_id: i64,
    pub channel: Channel,
    pub subject: Option<String>,
    pub message: String,
    pub sent_by: i64,
}

/// Aggregate outcome of one dispatch call. Not persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub success_count: usize,
    pub failure_count: usize,
    pub skipped_count: usize,
}

impl BatchResult {
    pub fn total(&self) -> usize {
        self.success_count + self.failure_count + self.skipped_count
    }

    /// Operator-facing one-line summary.
    pub fn summary(&self) -> String {
        self.to_string()
    }
}

impl std::fmt::Display for BatchResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} sent, {} failed, {} skipped",
            self.success_count, self.failure_count, self.skipped_count
        )
    }
}
