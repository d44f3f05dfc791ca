//! Recipient resolver: turns a selection criterion into a bounded, ordered
//! list of recipients.
//!
//! Resolution never fails: a lookup error, an unknown criterion or a missing
//! filter id all produce an empty list. Callers must check for emptiness.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use sqlx::PgPool;

use civic_common::error::AppError;
use civic_common::types::{Recipient, RecipientType};

/// A recipient selection criterion with its filter id, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Criterion {
    /// Businesses and properties with an outstanding balance.
    AllDefaulters,
    BusinessDefaulters,
    PropertyDefaulters,
    /// Businesses and properties in a zone.
    Zone(i64),
    /// Businesses of a business type.
    BusinessType(i64),
    AllBusinesses,
    AllProperties,
    AllUsers,
}

/// Filter parameters accompanying a criterion name.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CriterionParams {
    pub zone_id: Option<i64>,
    pub business_type_id: Option<i64>,
}

impl Criterion {
    /// Parse a criterion by wire name.
    ///
    /// Returns `None` for unknown names and for `zone`/`business_type` without
    /// a positive filter id, so that "nothing selected" never means "all".
    pub fn parse(name: &str, params: &CriterionParams) -> Option<Self> {
        match name {
            "all_defaulters" => Some(Criterion::AllDefaulters),
            "business_defaulters" => Some(Criterion::BusinessDefaulters),
            "property_defaulters" => Some(Criterion::PropertyDefaulters),
            "zone" => params.zone_id.filter(|id| *id > 0).map(Criterion::Zone),
            "business_type" => params
                .business_type_id
                .filter(|id| *id > 0)
                .map(Criterion::BusinessType),
            "all_businesses" => Some(Criterion::AllBusinesses),
            "all_properties" => Some(Criterion::AllProperties),
            "all_users" => Some(Criterion::AllUsers),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Criterion::AllDefaulters => "all_defaulters",
            Criterion::BusinessDefaulters => "business_defaulters",
            Criterion::PropertyDefaulters => "property_defaulters",
            Criterion::Zone(_) => "zone",
            Criterion::BusinessType(_) => "business_type",
            Criterion::AllBusinesses => "all_businesses",
            Criterion::AllProperties => "all_properties",
            Criterion::AllUsers => "all_users",
        }
    }

    /// Maximum number of recipients this criterion may resolve to.
    pub fn cap(&self) -> usize {
        match self {
            Criterion::AllDefaulters => 300,
            Criterion::BusinessDefaulters => 200,
            Criterion::PropertyDefaulters => 200,
            Criterion::Zone(_) => 300,
            Criterion::BusinessType(_) => 200,
            Criterion::AllBusinesses => 300,
            Criterion::AllProperties => 300,
            Criterion::AllUsers => 100,
        }
    }
}

/// Read access to the registry tables recipients are drawn from.
#[async_trait]
pub trait RecipientSource: Send + Sync {
    /// Fetch at most `limit` recipients matching `criterion`.
    async fn fetch(&self, criterion: Criterion, limit: usize) -> Result<Vec<Recipient>, AppError>;

    /// Look up a single registry entity.
    async fn find(
        &self,
        recipient_type: RecipientType,
        id: i64,
    ) -> Result<Option<Recipient>, AppError>;
}

const BUSINESS_COLUMNS: &str = "SELECT id, 'business'::text AS recipient_type, \
     business_name AS display_name, owner_phone AS phone FROM businesses";

const PROPERTY_COLUMNS: &str = "SELECT id, 'property'::text AS recipient_type, \
     owner_name AS display_name, owner_phone AS phone FROM properties";

const USER_COLUMNS: &str = "SELECT id, 'user'::text AS recipient_type, \
     full_name AS display_name, phone FROM users";

/// Byte order, matching [`sort_recipients`], so the capped set and the
/// returned order follow one rule.
const ORDER_BY: &str = "ORDER BY display_name COLLATE \"C\", recipient_type COLLATE \"C\", id";

/// PostgreSQL-backed recipient source.
pub struct PgRecipientSource {
    pool: PgPool,
}

impl PgRecipientSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Build the SQL for a criterion. Filter ids are bound as `$1`, the limit
    /// as the last parameter.
    fn query_for(criterion: Criterion) -> String {
        match criterion {
            Criterion::AllDefaulters => format!(
                "SELECT * FROM ( \
                    {BUSINESS_COLUMNS} WHERE status = 'active' AND outstanding_balance > 0 \
                    UNION ALL \
                    {PROPERTY_COLUMNS} WHERE status = 'active' AND outstanding_balance > 0 \
                 ) r {ORDER_BY} LIMIT $1"
            ),
            Criterion::BusinessDefaulters => format!(
                "{BUSINESS_COLUMNS} WHERE status = 'active' AND outstanding_balance > 0 \
                 {ORDER_BY} LIMIT $1"
            ),
            Criterion::PropertyDefaulters => format!(
                "{PROPERTY_COLUMNS} WHERE status = 'active' AND outstanding_balance > 0 \
                 {ORDER_BY} LIMIT $1"
            ),
            Criterion::Zone(_) => format!(
                "SELECT * FROM ( \
                    {BUSINESS_COLUMNS} WHERE status = 'active' AND zone_id = $1 \
                    UNION ALL \
                    {PROPERTY_COLUMNS} WHERE status = 'active' AND zone_id = $1 \
                 ) r {ORDER_BY} LIMIT $2"
            ),
            Criterion::BusinessType(_) => format!(
                "{BUSINESS_COLUMNS} WHERE status = 'active' AND business_type_id = $1 \
                 {ORDER_BY} LIMIT $2"
            ),
            Criterion::AllBusinesses => {
                format!("{BUSINESS_COLUMNS} WHERE status = 'active' {ORDER_BY} LIMIT $1")
            }
            Criterion::AllProperties => {
                format!("{PROPERTY_COLUMNS} WHERE status = 'active' {ORDER_BY} LIMIT $1")
            }
            Criterion::AllUsers => {
                format!("{USER_COLUMNS} WHERE status = 'active' {ORDER_BY} LIMIT $1")
            }
        }
    }
}

#[async_trait]
impl RecipientSource for PgRecipientSource {
    async fn fetch(&self, criterion: Criterion, limit: usize) -> Result<Vec<Recipient>, AppError> {
        let sql = Self::query_for(criterion);
        let limit = limit as i64;

        let query = sqlx::query_as::<_, Recipient>(&sql);
        let query = match criterion {
            Criterion::Zone(id) | Criterion::BusinessType(id) => query.bind(id).bind(limit),
            _ => query.bind(limit),
        };

        Ok(query.fetch_all(&self.pool).await?)
    }

    async fn find(
        &self,
        recipient_type: RecipientType,
        id: i64,
    ) -> Result<Option<Recipient>, AppError> {
        let columns = match recipient_type {
            RecipientType::Business => BUSINESS_COLUMNS,
            RecipientType::Property => PROPERTY_COLUMNS,
            RecipientType::User => USER_COLUMNS,
        };
        let sql = format!("{columns} WHERE id = $1");

        let recipient = sqlx::query_as::<_, Recipient>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(recipient)
    }
}

/// Resolves criteria to recipients through a [`RecipientSource`].
#[derive(Clone)]
pub struct RecipientResolver {
    source: Arc<dyn RecipientSource>,
}

impl RecipientResolver {
    pub fn new(source: Arc<dyn RecipientSource>) -> Self {
        Self { source }
    }

    /// Resolve a criterion given by wire name.
    pub async fn resolve(&self, criterion: &str, params: &CriterionParams) -> Vec<Recipient> {
        match Criterion::parse(criterion, params) {
            Some(parsed) => self.resolve_criterion(parsed).await,
            None => {
                tracing::debug!(
                    criterion,
                    zone_id = ?params.zone_id,
                    business_type_id = ?params.business_type_id,
                    "Unrecognized criterion or missing filter id, no recipients"
                );
                Vec::new()
            }
        }
    }

    /// Resolve a parsed criterion: capped, ordered by name, empty on failure.
    pub async fn resolve_criterion(&self, criterion: Criterion) -> Vec<Recipient> {
        let cap = criterion.cap();

        match self.source.fetch(criterion, cap).await {
            Ok(mut recipients) => {
                sort_recipients(&mut recipients);
                recipients.truncate(cap);
                tracing::debug!(
                    criterion = criterion.name(),
                    count = recipients.len(),
                    "Recipients resolved"
                );
                recipients
            }
            Err(e) => {
                tracing::warn!(
                    criterion = criterion.name(),
                    error = %e,
                    "Recipient lookup failed, treating as no recipients"
                );
                Vec::new()
            }
        }
    }

    /// Look up one registry entity for an individual send.
    pub async fn find(
        &self,
        recipient_type: RecipientType,
        id: i64,
    ) -> Result<Option<Recipient>, AppError> {
        self.source.find(recipient_type, id).await
    }
}

/// Order by display name, then type, then id. Names compare byte-wise.
fn sort_recipients(recipients: &mut [Recipient]) {
    recipients.sort_by(|a, b| {
        a.display_name
            .cmp(&b.display_name)
            .then_with(|| a.recipient_type.cmp(&b.recipient_type))
            .then_with(|| a.id.cmp(&b.id))
    });
}
