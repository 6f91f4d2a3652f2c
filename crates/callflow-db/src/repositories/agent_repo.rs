//! Agent repository implementation

use async_trait::async_trait;
use callflow_core::{models::Agent, traits::AgentRepository, AppError, AppResult};
use sqlx::PgPool;
use tracing::{error, instrument};
use uuid::Uuid;

/// PostgreSQL implementation of AgentRepository
pub struct PgAgentRepository {
    pool: PgPool,
}

impl PgAgentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AgentRepository for PgAgentRepository {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Agent>> {
        let row = sqlx::query_as::<sqlx::Postgres, AgentRow>(
            r#"
            SELECT id, organisation_id, name, external_agent_id, metadata
            FROM agents
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding agent {}: {}", id, e);
            AppError::Database(format!("Failed to find agent: {}", e))
        })?;

        Ok(row.map(Into::into))
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AgentRow {
    id: Uuid,
    organisation_id: Uuid,
    name: String,
    external_agent_id: String,
    metadata: serde_json::Value,
}

impl From<AgentRow> for Agent {
    fn from(row: AgentRow) -> Self {
        Self {
            id: row.id,
            organisation_id: row.organisation_id,
            name: row.name,
            external_agent_id: row.external_agent_id,
            metadata: row.metadata,
        }
    }
}
