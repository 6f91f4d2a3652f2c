//! Conversation endpoints used by the voice engine

use actix_web::{web, HttpResponse};
use callflow_core::{models::ConversationRecord, AppError};
use tracing::{instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::dto::{ApiResponse, RecordConversationRequest};
use crate::state::AppState;

/// POST /api/v1/call-logs/{id}/conversation
#[instrument(skip(state, req))]
pub async fn record_conversation(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    req: web::Json<RecordConversationRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| {
        warn!("Conversation validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let record = ConversationRecord::from(req.into_inner());
    state
        .conversation
        .record_conversation(path.into_inner(), &record)
        .await?;

    Ok(HttpResponse::NoContent().finish())
}

/// GET /api/v1/call-logs/{id}/context
#[instrument(skip(state))]
pub async fn conversation_context(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let context = state
        .conversation
        .conversation_context(path.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(context)))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/call-logs")
            .route("/{id}/conversation", web::post().to(record_conversation))
            .route("/{id}/context", web::get().to(conversation_context)),
    );
}
