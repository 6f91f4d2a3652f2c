//! Campaign repository implementation

use async_trait::async_trait;
use callflow_core::{
    models::{Campaign, CampaignStatus},
    traits::CampaignRepository,
    AppError, AppResult,
};
use chrono::{DateTime, NaiveTime, Utc};
use sqlx::PgPool;
use tracing::{debug, error, instrument};
use uuid::Uuid;

/// PostgreSQL implementation of CampaignRepository
pub struct PgCampaignRepository {
    pool: PgPool,
}

impl PgCampaignRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CampaignRepository for PgCampaignRepository {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Campaign>> {
        debug!("Finding campaign by id: {}", id);

        let row = sqlx::query_as::<sqlx::Postgres, CampaignRow>(
            r#"
            SELECT
                id, organisation_id, name, status,
                availability_start_time, availability_end_time,
                agent_id, created_at, updated_at
            FROM campaigns
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding campaign {}: {}", id, e);
            AppError::Database(format!("Failed to find campaign: {}", e))
        })?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn find_runnable(&self, now: NaiveTime) -> AppResult<Vec<Campaign>> {
        let rows = sqlx::query_as::<sqlx::Postgres, CampaignRow>(
            r#"
            SELECT
                id, organisation_id, name, status,
                availability_start_time, availability_end_time,
                agent_id, created_at, updated_at
            FROM campaigns
            WHERE status = 'running'
              AND (
                (availability_start_time <= availability_end_time
                    AND $1 BETWEEN availability_start_time AND availability_end_time)
                OR
                (availability_start_time > availability_end_time
                    AND ($1 >= availability_start_time OR $1 <= availability_end_time))
              )
            ORDER BY created_at
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error listing runnable campaigns: {}", e);
            AppError::Database(format!("Failed to list runnable campaigns: {}", e))
        })?;

        debug!("Found {} runnable campaigns", rows.len());
        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn transition_status(
        &self,
        id: Uuid,
        from: &[CampaignStatus],
        to: CampaignStatus,
    ) -> AppResult<bool> {
        let from: Vec<String> = from.iter().map(ToString::to_string).collect();

        let result = sqlx::query(
            r#"
            UPDATE campaigns
            SET status = $2,
                updated_at = NOW()
            WHERE id = $1
              AND status = ANY($3)
            "#,
        )
        .bind(id)
        .bind(to.to_string())
        .bind(&from)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error updating campaign {} status: {}", id, e);
            AppError::Database(format!("Failed to update campaign status: {}", e))
        })?;

        Ok(result.rows_affected() > 0)
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct CampaignRow {
    id: Uuid,
    organisation_id: Uuid,
    name: String,
    status: String,
    availability_start_time: NaiveTime,
    availability_end_time: NaiveTime,
    agent_id: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<CampaignRow> for Campaign {
    fn from(row: CampaignRow) -> Self {
        Self {
            id: row.id,
            organisation_id: row.organisation_id,
            name: row.name,
            // Unknown values never run
            status: CampaignStatus::from_str(&row.status).unwrap_or(CampaignStatus::Stopped),
            availability_start_time: row.availability_start_time,
            availability_end_time: row.availability_end_time,
            agent_id: row.agent_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
