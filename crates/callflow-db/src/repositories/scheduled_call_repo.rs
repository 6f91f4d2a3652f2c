//! Scheduled call repository implementation

use async_trait::async_trait;
use callflow_core::{
    models::{ProviderKind, ScheduledCall, ScheduledCallStatus},
    traits::ScheduledCallRepository,
    AppError, AppResult,
};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, error, instrument};
use uuid::Uuid;

/// PostgreSQL implementation of ScheduledCallRepository
pub struct PgScheduledCallRepository {
    pool: PgPool,
}

impl PgScheduledCallRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScheduledCallRepository for PgScheduledCallRepository {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<ScheduledCall>> {
        let row = sqlx::query_as::<sqlx::Postgres, ScheduledCallRow>(
            r#"
            SELECT
                id, organisation_id, agent_id, to_number, from_number, provider,
                call_at, status, end_call_url, failure_reason, data,
                created_at, updated_at
            FROM scheduled_calls
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding scheduled call {}: {}", id, e);
            AppError::Database(format!("Failed to find scheduled call: {}", e))
        })?;

        row.map(TryInto::try_into).transpose()
    }

    #[instrument(skip(self))]
    async fn find_due(&self, now: DateTime<Utc>, limit: i64) -> AppResult<Vec<ScheduledCall>> {
        let rows = sqlx::query_as::<sqlx::Postgres, ScheduledCallRow>(
            r#"
            SELECT
                id, organisation_id, agent_id, to_number, from_number, provider,
                call_at, status, end_call_url, failure_reason, data,
                created_at, updated_at
            FROM scheduled_calls
            WHERE status = 'scheduled'
              AND call_at <= $1
            ORDER BY call_at
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error listing due scheduled calls: {}", e);
            AppError::Database(format!("Failed to list due scheduled calls: {}", e))
        })?;

        debug!("Found {} due scheduled calls", rows.len());
        rows.into_iter().map(TryInto::try_into).collect()
    }

    #[instrument(skip(self))]
    async fn transition(
        &self,
        id: Uuid,
        from: ScheduledCallStatus,
        to: ScheduledCallStatus,
        failure_reason: Option<&str>,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE scheduled_calls
            SET status = $3,
                failure_reason = COALESCE($4, failure_reason),
                updated_at = NOW()
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(id)
        .bind(from.to_string())
        .bind(to.to_string())
        .bind(failure_reason)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error updating scheduled call {}: {}", id, e);
            AppError::Database(format!("Failed to update scheduled call: {}", e))
        })?;

        Ok(result.rows_affected() > 0)
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct ScheduledCallRow {
    id: Uuid,
    organisation_id: Uuid,
    agent_id: Uuid,
    to_number: String,
    from_number: String,
    provider: String,
    call_at: DateTime<Utc>,
    status: String,
    end_call_url: Option<String>,
    failure_reason: Option<String>,
    data: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ScheduledCallRow> for ScheduledCall {
    type Error = AppError;

    fn try_from(row: ScheduledCallRow) -> Result<Self, Self::Error> {
        let provider = ProviderKind::from_str(&row.provider)
            .ok_or_else(|| AppError::UnknownProvider(row.provider.clone()))?;

        Ok(Self {
            id: row.id,
            organisation_id: row.organisation_id,
            agent_id: row.agent_id,
            to_number: row.to_number,
            from_number: row.from_number,
            provider,
            call_at: row.call_at,
            status: ScheduledCallStatus::from_str(&row.status)
                .unwrap_or(ScheduledCallStatus::Failed),
            end_call_url: row.end_call_url,
            failure_reason: row.failure_reason,
            data: row.data,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
