//! Call log repository implementation

use async_trait::async_trait;
use callflow_core::{
    models::{
        AttemptOutcome, CallLog, CallStatus, CallType, ConversationRecord, NewCallLog, ProviderKind,
    },
    traits::CallLogRepository,
    AppError, AppResult,
};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;

use super::attempt;

const CALL_LOG_COLUMNS: &str = r#"
    call_logs_id, call_type, customer_id, request_uuid, provider,
    to_number, from_number, organisation_id, agent_id, usecase_id,
    hangup_cause, duration_billed, conversation_id, transcript, summary,
    created_at, ended_at
"#;

/// PostgreSQL implementation of CallLogRepository
pub struct PgCallLogRepository {
    pool: PgPool,
}

impl PgCallLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CallLogRepository for PgCallLogRepository {
    #[instrument(skip(self, log), fields(request_uuid = %log.request_uuid))]
    async fn create(&self, log: &NewCallLog) -> AppResult<CallLog> {
        debug!("Creating call log {}", log.call_logs_id);

        let query = format!(
            r#"
            INSERT INTO call_logs (
                call_logs_id, call_type, customer_id, request_uuid, provider,
                to_number, from_number, organisation_id, agent_id, usecase_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {}
            "#,
            CALL_LOG_COLUMNS
        );

        let row = sqlx::query_as::<sqlx::Postgres, CallLogRow>(&query)
            .bind(log.call_logs_id)
            .bind(log.call_type.to_string())
            .bind(&log.customer_id)
            .bind(&log.request_uuid)
            .bind(log.provider.to_string())
            .bind(&log.to_number)
            .bind(&log.from_number)
            .bind(log.organisation_id)
            .bind(log.agent_id)
            .bind(log.usecase_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error creating call log: {}", e);
                if e.to_string().contains("unique constraint") {
                    AppError::Conflict(format!("Call {} already logged", log.request_uuid))
                } else {
                    AppError::Database(format!("Failed to create call log: {}", e))
                }
            })?;

        row.try_into()
    }

    #[instrument(skip(self))]
    async fn find_by_id(&self, call_logs_id: Uuid) -> AppResult<Option<CallLog>> {
        let query = format!(
            "SELECT {} FROM call_logs WHERE call_logs_id = $1",
            CALL_LOG_COLUMNS
        );

        let row = sqlx::query_as::<sqlx::Postgres, CallLogRow>(&query)
            .bind(call_logs_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error finding call log {}: {}", call_logs_id, e);
                AppError::Database(format!("Failed to find call log: {}", e))
            })?;

        row.map(TryInto::try_into).transpose()
    }

    #[instrument(skip(self))]
    async fn find_by_request_uuid(&self, request_uuid: &str) -> AppResult<Option<CallLog>> {
        let query = format!(
            "SELECT {} FROM call_logs WHERE request_uuid = $1",
            CALL_LOG_COLUMNS
        );

        let row = sqlx::query_as::<sqlx::Postgres, CallLogRow>(&query)
            .bind(request_uuid)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error finding call log by request uuid: {}", e);
                AppError::Database(format!("Failed to find call log: {}", e))
            })?;

        row.map(TryInto::try_into).transpose()
    }

    #[instrument(skip(self))]
    async fn reconcile_hangup(
        &self,
        request_uuid: &str,
        hangup_cause: &str,
        duration_billed: i64,
        outcome: AttemptOutcome,
    ) -> AppResult<Option<CallLog>> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to start transaction: {}", e);
            AppError::Transaction(format!("Failed to start transaction: {}", e))
        })?;

        // The hangup_cause guard makes duplicate webhooks a no-op
        let query = format!(
            r#"
            UPDATE call_logs
            SET hangup_cause = $2,
                duration_billed = $3,
                ended_at = NOW()
            WHERE request_uuid = $1
              AND hangup_cause IS NULL
            RETURNING {}
            "#,
            CALL_LOG_COLUMNS
        );

        let row = sqlx::query_as::<sqlx::Postgres, CallLogRow>(&query)
            .bind(request_uuid)
            .bind(hangup_cause)
            .bind(duration_billed)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| {
                error!("Database error recording hangup for {}: {}", request_uuid, e);
                AppError::Database(format!("Failed to record hangup: {}", e))
            })?;

        let Some(row) = row else {
            return Ok(None);
        };
        let log = CallLog::try_from(row)?;

        match log.call_type {
            CallType::CampaignOutbound => match log.customer_id.parse::<i64>() {
                Ok(call_id) => {
                    let (status, retry_after) = match outcome {
                        AttemptOutcome::Completed => (CallStatus::Completed, None),
                        AttemptOutcome::RetryAfter(date) => (CallStatus::NotInitiated, Some(date)),
                    };
                    if !attempt::close_attempt(&mut tx, call_id, status, retry_after).await? {
                        debug!("Campaign call {} was not in process", call_id);
                    }
                }
                Err(_) => warn!(
                    "Call log {} has no campaign call id ({})",
                    log.call_logs_id, log.customer_id
                ),
            },
            CallType::ScheduledOutbound => match Uuid::parse_str(&log.customer_id) {
                Ok(scheduled_id) => {
                    sqlx::query(
                        r#"
                        UPDATE scheduled_calls
                        SET status = 'completed', updated_at = NOW()
                        WHERE id = $1 AND status = 'in_process'
                        "#,
                    )
                    .bind(scheduled_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| {
                        error!("Database error completing scheduled call {}: {}", scheduled_id, e);
                        AppError::Database(format!("Failed to complete scheduled call: {}", e))
                    })?;
                }
                Err(_) => warn!(
                    "Call log {} has no scheduled call id ({})",
                    log.call_logs_id, log.customer_id
                ),
            },
            CallType::Inbound => {}
        }

        if duration_billed > 0 {
            sqlx::query(
                r#"
                UPDATE organisations
                SET calls_consumed = calls_consumed + 1,
                    consumed_call_minutes = consumed_call_minutes + $2,
                    updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(log.organisation_id)
            .bind(duration_billed)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                error!("Database error updating usage for {}: {}", log.organisation_id, e);
                AppError::Database(format!("Failed to update organisation usage: {}", e))
            })?;
        }

        tx.commit().await.map_err(|e| {
            error!("Failed to commit hangup for {}: {}", request_uuid, e);
            AppError::Transaction(format!("Failed to commit transaction: {}", e))
        })?;

        Ok(Some(log))
    }

    #[instrument(skip(self, record))]
    async fn record_conversation(
        &self,
        call_logs_id: Uuid,
        record: &ConversationRecord,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE call_logs
            SET conversation_id = $2,
                transcript = COALESCE($3, transcript),
                summary = COALESCE($4, summary)
            WHERE call_logs_id = $1
            "#,
        )
        .bind(call_logs_id)
        .bind(&record.conversation_id)
        .bind(&record.transcript)
        .bind(&record.summary)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error recording conversation for {}: {}", call_logs_id, e);
            AppError::Database(format!("Failed to record conversation: {}", e))
        })?;

        Ok(result.rows_affected() > 0)
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct CallLogRow {
    call_logs_id: Uuid,
    call_type: String,
    customer_id: String,
    request_uuid: String,
    provider: String,
    to_number: String,
    from_number: String,
    organisation_id: Uuid,
    agent_id: Uuid,
    usecase_id: Option<Uuid>,
    hangup_cause: Option<String>,
    duration_billed: Option<i64>,
    conversation_id: Option<String>,
    transcript: Option<serde_json::Value>,
    summary: Option<String>,
    created_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
}

impl TryFrom<CallLogRow> for CallLog {
    type Error = AppError;

    fn try_from(row: CallLogRow) -> Result<Self, Self::Error> {
        let call_type = CallType::from_str(&row.call_type).ok_or_else(|| {
            AppError::Internal(format!("Unknown call type stored: {}", row.call_type))
        })?;
        let provider = ProviderKind::from_str(&row.provider)
            .ok_or_else(|| AppError::UnknownProvider(row.provider.clone()))?;

        Ok(Self {
            call_logs_id: row.call_logs_id,
            call_type,
            customer_id: row.customer_id,
            request_uuid: row.request_uuid,
            provider,
            to_number: row.to_number,
            from_number: row.from_number,
            organisation_id: row.organisation_id,
            agent_id: row.agent_id,
            usecase_id: row.usecase_id,
            hangup_cause: row.hangup_cause,
            duration_billed: row.duration_billed,
            conversation_id: row.conversation_id,
            transcript: row.transcript,
            summary: row.summary,
            created_at: row.created_at,
            ended_at: row.ended_at,
        })
    }
}
