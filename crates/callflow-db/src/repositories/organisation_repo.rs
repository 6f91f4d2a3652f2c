//! Organisation usage and subscription repository implementation

use async_trait::async_trait;
use callflow_core::{
    models::{OrganisationUsage, Subscription, SubscriptionStatus},
    traits::{OrganisationRepository, SubscriptionRepository},
    AppError, AppResult,
};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{error, instrument};
use uuid::Uuid;

/// PostgreSQL implementation of OrganisationRepository and SubscriptionRepository
pub struct PgOrganisationRepository {
    pool: PgPool,
}

impl PgOrganisationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrganisationRepository for PgOrganisationRepository {
    #[instrument(skip(self))]
    async fn find_usage(&self, organisation_id: Uuid) -> AppResult<Option<OrganisationUsage>> {
        let row: Option<(Uuid, i64, i64)> = sqlx::query_as(
            r#"
            SELECT id, calls_consumed, consumed_call_minutes
            FROM organisations
            WHERE id = $1
            "#,
        )
        .bind(organisation_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding organisation {}: {}", organisation_id, e);
            AppError::Database(format!("Failed to find organisation: {}", e))
        })?;

        Ok(row.map(
            |(organisation_id, calls_consumed, consumed_call_minutes)| OrganisationUsage {
                organisation_id,
                calls_consumed,
                consumed_call_minutes,
            },
        ))
    }

}

#[async_trait]
impl SubscriptionRepository for PgOrganisationRepository {
    #[instrument(skip(self))]
    async fn find_subscription(&self, organisation_id: Uuid) -> AppResult<Option<Subscription>> {
        // Latest subscription wins
        let row = sqlx::query_as::<sqlx::Postgres, SubscriptionRow>(
            r#"
            SELECT organisation_id, status, end_date, total_calls_allowed, total_call_minutes
            FROM subscriptions
            WHERE organisation_id = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(organisation_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding subscription for {}: {}", organisation_id, e);
            AppError::Database(format!("Failed to find subscription: {}", e))
        })?;

        Ok(row.map(Into::into))
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SubscriptionRow {
    organisation_id: Uuid,
    status: String,
    end_date: DateTime<Utc>,
    total_calls_allowed: i64,
    total_call_minutes: i64,
}

impl From<SubscriptionRow> for Subscription {
    fn from(row: SubscriptionRow) -> Self {
        Self {
            organisation_id: row.organisation_id,
            status: SubscriptionStatus::from_str(&row.status),
            end_date: row.end_date,
            total_calls_allowed: row.total_calls_allowed,
            total_call_minutes: row.total_call_minutes,
        }
    }
}
