//! Inbound campaign repository implementation

use async_trait::async_trait;
use callflow_core::{
    models::{InboundCampaign, InboundStatus, ProviderKind},
    traits::InboundCampaignRepository,
    AppError, AppResult,
};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{error, instrument};
use uuid::Uuid;

/// PostgreSQL implementation of InboundCampaignRepository
pub struct PgInboundCampaignRepository {
    pool: PgPool,
}

impl PgInboundCampaignRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InboundCampaignRepository for PgInboundCampaignRepository {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<InboundCampaign>> {
        let row = sqlx::query_as::<sqlx::Postgres, InboundRow>(
            r#"
            SELECT
                i.id, i.organisation_id, i.agent_id, i.status, i.created_at,
                n.phone_number, c.provider
            FROM inbound_campaigns i
            JOIN inbound_campaign_numbers n ON n.inbound_campaign_id = i.id
            JOIN organisation_contacts c ON c.phone_number = n.phone_number
            WHERE i.id = $1
            ORDER BY n.phone_number
            LIMIT 1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding inbound campaign {}: {}", id, e);
            AppError::Database(format!("Failed to find inbound campaign: {}", e))
        })?;

        row.map(TryInto::try_into).transpose()
    }

    #[instrument(skip(self))]
    async fn find_by_phone_number(&self, phone_number: &str) -> AppResult<Option<InboundCampaign>> {
        let row = sqlx::query_as::<sqlx::Postgres, InboundRow>(
            r#"
            SELECT
                i.id, i.organisation_id, i.agent_id, i.status, i.created_at,
                n.phone_number, c.provider
            FROM inbound_campaign_numbers n
            JOIN inbound_campaigns i ON i.id = n.inbound_campaign_id
            JOIN organisation_contacts c ON c.phone_number = n.phone_number
            WHERE n.phone_number = $1
            "#,
        )
        .bind(phone_number)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error resolving inbound number {}: {}", phone_number, e);
            AppError::Database(format!("Failed to find inbound campaign: {}", e))
        })?;

        row.map(TryInto::try_into).transpose()
    }

    #[instrument(skip(self))]
    async fn set_status(&self, id: Uuid, status: InboundStatus) -> AppResult<bool> {
        let result = sqlx::query("UPDATE inbound_campaigns SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error updating inbound campaign {}: {}", id, e);
                AppError::Database(format!("Failed to update inbound campaign: {}", e))
            })?;

        Ok(result.rows_affected() > 0)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct InboundRow {
    id: Uuid,
    organisation_id: Uuid,
    agent_id: Uuid,
    status: String,
    created_at: DateTime<Utc>,
    phone_number: String,
    provider: String,
}

impl TryFrom<InboundRow> for InboundCampaign {
    type Error = AppError;

    fn try_from(row: InboundRow) -> Result<Self, Self::Error> {
        let provider = ProviderKind::from_str(&row.provider)
            .ok_or_else(|| AppError::UnknownProvider(row.provider.clone()))?;

        Ok(Self {
            id: row.id,
            organisation_id: row.organisation_id,
            agent_id: row.agent_id,
            status: InboundStatus::from_str(&row.status).unwrap_or(InboundStatus::Stopped),
            phone_number: row.phone_number,
            provider,
            created_at: row.created_at,
        })
    }
}
