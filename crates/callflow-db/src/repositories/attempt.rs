//! Closing a campaign call attempt inside a caller's transaction
//!
//! Shared by the abort path of the campaign call repository and by hangup
//! reconciliation, which must close the attempt together with the call log.

use callflow_core::{models::CallStatus, AppError, AppResult};
use chrono::NaiveDate;
use sqlx::{Postgres, Transaction};
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Close an in-process attempt: consume one retry, count the attempt, set
/// the resulting status and free the line it held.
///
/// Returns false, writing nothing, if the call is not in process.
pub(crate) async fn close_attempt(
    tx: &mut Transaction<'static, Postgres>,
    call_id: i64,
    status: CallStatus,
    retry_after: Option<NaiveDate>,
) -> AppResult<bool> {
    let held: Option<(Uuid, Option<String>)> = sqlx::query_as(
        r#"
        SELECT campaign_id, from_number
        FROM campaign_calls
        WHERE id = $1 AND status = 'in_process'
        FOR UPDATE
        "#,
    )
    .bind(call_id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| {
        error!("Database error locking campaign call {}: {}", call_id, e);
        AppError::Database(format!("Failed to lock campaign call: {}", e))
    })?;

    let Some((campaign_id, from_number)) = held else {
        debug!("Campaign call {} is not in process, nothing to close", call_id);
        return Ok(false);
    };

    sqlx::query(
        r#"
        UPDATE campaign_calls
        SET status = $2,
            retry = GREATEST(retry - 1, 0),
            total_calls = total_calls + 1,
            next_possible_call_date = COALESCE($3, next_possible_call_date),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(call_id)
    .bind(status.to_string())
    .bind(retry_after)
    .execute(&mut **tx)
    .await
    .map_err(|e| {
        error!("Database error closing campaign call {}: {}", call_id, e);
        AppError::Database(format!("Failed to update campaign call: {}", e))
    })?;

    match from_number {
        Some(number) => {
            sqlx::query(
                r#"
                UPDATE campaign_phone_numbers
                SET status = 'available'
                WHERE campaign_id = $1 AND phone_number = $2
                "#,
            )
            .bind(campaign_id)
            .bind(&number)
            .execute(&mut **tx)
            .await
            .map_err(|e| {
                error!("Database error releasing line {}: {}", number, e);
                AppError::Database(format!("Failed to release phone line: {}", e))
            })?;
        }
        None => warn!("Campaign call {} was in process without a line", call_id),
    }

    Ok(true)
}
