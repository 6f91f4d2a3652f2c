//! Campaign call repository implementation
//!
//! Claiming and releasing a call always touches the call row and its phone
//! line in the same transaction, so an `in_process` call is never observed
//! without its line marked `unavailable`.

use async_trait::async_trait;
use callflow_core::{
    models::{CallStatus, CampaignCall, NewCampaignCall},
    traits::CampaignCallRepository,
    AppError, AppResult,
};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, error, instrument};
use uuid::Uuid;

use super::attempt;

/// PostgreSQL implementation of CampaignCallRepository
pub struct PgCampaignCallRepository {
    pool: PgPool,
}

impl PgCampaignCallRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn begin(&self) -> AppResult<Transaction<'static, Postgres>> {
        self.pool.begin().await.map_err(|e| {
            error!("Failed to start transaction: {}", e);
            AppError::Transaction(format!("Failed to start transaction: {}", e))
        })
    }

    async fn commit(tx: Transaction<'static, Postgres>) -> AppResult<()> {
        tx.commit().await.map_err(|e| {
            error!("Failed to commit transaction: {}", e);
            AppError::Transaction(format!("Failed to commit transaction: {}", e))
        })
    }
}

#[async_trait]
impl CampaignCallRepository for PgCampaignCallRepository {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: i64) -> AppResult<Option<CampaignCall>> {
        let row = sqlx::query_as::<sqlx::Postgres, CampaignCallRow>(
            r#"
            SELECT
                id, campaign_id, phone_number, status, retry, total_calls,
                next_possible_call_date, from_number, call_at, data,
                created_at, updated_at
            FROM campaign_calls
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding campaign call {}: {}", id, e);
            AppError::Database(format!("Failed to find campaign call: {}", e))
        })?;

        row.map(TryInto::try_into).transpose()
    }

    #[instrument(skip(self))]
    async fn next_eligible(
        &self,
        campaign_id: Uuid,
        today: NaiveDate,
    ) -> AppResult<Option<CampaignCall>> {
        let row = sqlx::query_as::<sqlx::Postgres, CampaignCallRow>(
            r#"
            SELECT
                id, campaign_id, phone_number, status, retry, total_calls,
                next_possible_call_date, from_number, call_at, data,
                created_at, updated_at
            FROM campaign_calls
            WHERE campaign_id = $1
              AND status = 'not_initiated'
              AND retry > 0
              AND next_possible_call_date <= $2
            ORDER BY retry DESC, call_at ASC, id ASC
            LIMIT 1
            "#,
        )
        .bind(campaign_id)
        .bind(today)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error selecting next call for {}: {}", campaign_id, e);
            AppError::Database(format!("Failed to select next campaign call: {}", e))
        })?;

        row.map(TryInto::try_into).transpose()
    }

    #[instrument(skip(self))]
    async fn count_pending(&self, campaign_id: Uuid) -> AppResult<i64> {
        let result: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM campaign_calls
            WHERE campaign_id = $1
              AND (status = 'in_process' OR (status = 'not_initiated' AND retry > 0))
            "#,
        )
        .bind(campaign_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error counting pending calls for {}: {}", campaign_id, e);
            AppError::Database(format!("Failed to count pending calls: {}", e))
        })?;

        Ok(result.0)
    }

    #[instrument(skip(self, calls))]
    async fn insert_batch(&self, campaign_id: Uuid, calls: &[NewCampaignCall]) -> AppResult<u64> {
        debug!("Inserting {} calls into campaign {}", calls.len(), campaign_id);

        if calls.is_empty() {
            return Ok(0);
        }

        let mut tx = self.begin().await?;
        let mut inserted = 0;

        for call in calls {
            sqlx::query(
                r#"
                INSERT INTO campaign_calls (
                    campaign_id, phone_number, status, retry,
                    next_possible_call_date, call_at, data
                )
                VALUES ($1, $2, 'not_initiated', $3, $4, $5, $6)
                "#,
            )
            .bind(campaign_id)
            .bind(&call.phone_number)
            .bind(call.retry.max(0))
            .bind(call.next_possible_call_date)
            .bind(call.call_at)
            .bind(&call.data)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                error!("Failed to insert call {}: {}", call.phone_number, e);
                AppError::Database(format!("Failed to insert campaign call: {}", e))
            })?;

            inserted += 1;
        }

        Self::commit(tx).await?;
        Ok(inserted)
    }

    #[instrument(skip(self))]
    async fn begin_attempt(
        &self,
        call_id: i64,
        campaign_id: Uuid,
        from_number: &str,
    ) -> AppResult<bool> {
        let mut tx = self.begin().await?;

        let line = sqlx::query(
            r#"
            UPDATE campaign_phone_numbers
            SET status = 'unavailable'
            WHERE campaign_id = $1 AND phone_number = $2 AND status = 'available'
            "#,
        )
        .bind(campaign_id)
        .bind(from_number)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            error!("Database error claiming line {}: {}", from_number, e);
            AppError::Database(format!("Failed to claim phone line: {}", e))
        })?;

        if line.rows_affected() == 0 {
            debug!("Line {} was taken concurrently", from_number);
            return Ok(false);
        }

        let call = sqlx::query(
            r#"
            UPDATE campaign_calls
            SET status = 'in_process',
                from_number = $2,
                updated_at = NOW()
            WHERE id = $1
              AND campaign_id = $3
              AND status = 'not_initiated'
              AND retry > 0
            "#,
        )
        .bind(call_id)
        .bind(from_number)
        .bind(campaign_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            error!("Database error claiming campaign call {}: {}", call_id, e);
            AppError::Database(format!("Failed to claim campaign call: {}", e))
        })?;

        if call.rows_affected() == 0 {
            debug!("Campaign call {} was claimed concurrently", call_id);
            return Ok(false);
        }

        Self::commit(tx).await?;
        Ok(true)
    }

    #[instrument(skip(self))]
    async fn abort_attempt(&self, call_id: i64, retry_after: NaiveDate) -> AppResult<bool> {
        let mut tx = self.begin().await?;
        let closed =
            attempt::close_attempt(&mut tx, call_id, CallStatus::NotInitiated, Some(retry_after))
                .await?;
        if closed {
            Self::commit(tx).await?;
        }
        Ok(closed)
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct CampaignCallRow {
    id: i64,
    campaign_id: Uuid,
    phone_number: String,
    status: String,
    retry: i32,
    total_calls: i32,
    next_possible_call_date: NaiveDate,
    from_number: Option<String>,
    call_at: DateTime<Utc>,
    data: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CampaignCallRow> for CampaignCall {
    type Error = AppError;

    fn try_from(row: CampaignCallRow) -> Result<Self, Self::Error> {
        let status = CallStatus::from_str(&row.status).ok_or_else(|| {
            AppError::Internal(format!(
                "Unknown status stored for campaign call {}: {}",
                row.id, row.status
            ))
        })?;

        Ok(Self {
            id: row.id,
            campaign_id: row.campaign_id,
            phone_number: row.phone_number,
            status,
            retry: row.retry,
            total_calls: row.total_calls,
            next_possible_call_date: row.next_possible_call_date,
            from_number: row.from_number,
            call_at: row.call_at,
            data: row.data,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(status: &str) -> CampaignCallRow {
        let now = Utc::now();
        CampaignCallRow {
            id: 7,
            campaign_id: Uuid::new_v4(),
            phone_number: "+15551230001".to_string(),
            status: status.to_string(),
            retry: 3,
            total_calls: 0,
            next_possible_call_date: now.date_naive(),
            from_number: None,
            call_at: now,
            data: serde_json::json!({}),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_row_maps_known_status() {
        let call = CampaignCall::try_from(row("in_process")).unwrap();
        assert_eq!(call.status, CallStatus::InProcess);
    }

    #[test]
    fn test_row_with_unknown_status_is_an_error() {
        let err = CampaignCall::try_from(row("dialing")).unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
        assert!(err.to_string().contains("dialing"));
    }
}
