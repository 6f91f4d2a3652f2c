//! Campaign phone line repository implementation
//!
//! Lines are joined with `organisation_contacts` to resolve the provider each
//! number is provisioned with.

use async_trait::async_trait;
use callflow_core::{
    models::{LineStatus, PhoneLine, ProviderKind},
    traits::PhoneLineRepository,
    AppError, AppResult,
};
use sqlx::PgPool;
use tracing::{error, instrument, warn};
use uuid::Uuid;

/// PostgreSQL implementation of PhoneLineRepository
pub struct PgPhoneLineRepository {
    pool: PgPool,
}

impl PgPhoneLineRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch(&self, campaign_id: Uuid, only_available: bool) -> AppResult<Vec<PhoneLine>> {
        let rows = sqlx::query_as::<sqlx::Postgres, PhoneLineRow>(
            r#"
            SELECT n.campaign_id, n.phone_number, n.status, c.provider
            FROM campaign_phone_numbers n
            JOIN organisation_contacts c ON c.phone_number = n.phone_number
            WHERE n.campaign_id = $1
              AND ($2 = FALSE OR n.status = 'available')
            ORDER BY n.phone_number
            "#,
        )
        .bind(campaign_id)
        .bind(only_available)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error listing lines for {}: {}", campaign_id, e);
            AppError::Database(format!("Failed to list phone lines: {}", e))
        })?;

        Ok(rows.into_iter().filter_map(PhoneLineRow::into_line).collect())
    }
}

#[async_trait]
impl PhoneLineRepository for PgPhoneLineRepository {
    #[instrument(skip(self))]
    async fn list_available(&self, campaign_id: Uuid) -> AppResult<Vec<PhoneLine>> {
        self.fetch(campaign_id, true).await
    }

    #[instrument(skip(self))]
    async fn list_by_campaign(&self, campaign_id: Uuid) -> AppResult<Vec<PhoneLine>> {
        self.fetch(campaign_id, false).await
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PhoneLineRow {
    campaign_id: Uuid,
    phone_number: String,
    status: String,
    provider: String,
}

impl PhoneLineRow {
    /// Lines on an unsupported provider cannot be dispatched from
    fn into_line(self) -> Option<PhoneLine> {
        let Some(provider) = ProviderKind::from_str(&self.provider) else {
            warn!(
                "Skipping line {} with unknown provider {}",
                self.phone_number, self.provider
            );
            return None;
        };

        Some(PhoneLine {
            campaign_id: self.campaign_id,
            phone_number: self.phone_number,
            status: LineStatus::from_str(&self.status).unwrap_or(LineStatus::Unavailable),
            provider,
        })
    }
}
