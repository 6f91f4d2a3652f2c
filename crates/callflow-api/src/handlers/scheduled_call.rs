use actix_web::{web, HttpResponse};
use callflow_core::AppError;
use serde_json::json;
use tracing::instrument;
use uuid::Uuid;

use crate::dto::ApiResponse;
use crate::state::AppState;

/// Place a scheduled call now instead of waiting for the poller
///
/// POST /api/v1/scheduled-calls/{id}/trigger
#[instrument(skip(state))]
pub async fn trigger_scheduled_call(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    let log = state.scheduled_calls.place(id).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(json!({
        "scheduled_call_id": id,
        "call_logs_id": log.call_logs_id,
        "request_uuid": log.request_uuid,
    }))))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route(
        "/scheduled-calls/{id}/trigger",
        web::post().to(trigger_scheduled_call),
    );
}
