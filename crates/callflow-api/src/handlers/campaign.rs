//! Campaign handlers

use actix_web::{web, HttpResponse};
use callflow_core::AppError;
use callflow_services::ContactInput;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::dto::{AddCallsRequest, AddCallsResponse, ApiResponse, CampaignResponse, RunCampaignResponse};
use crate::state::AppState;

/// POST /api/v1/campaigns/{id}/start
#[instrument(skip(state))]
pub async fn start_campaign(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let campaign = state.admin.start(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::with_message(
        CampaignResponse::from(campaign),
        "Campaign started",
    )))
}

/// POST /api/v1/campaigns/{id}/stop
#[instrument(skip(state))]
pub async fn stop_campaign(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let campaign = state.admin.stop(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::with_message(
        CampaignResponse::from(campaign),
        "Campaign stopped",
    )))
}

/// Append contacts to the backlog
///
/// POST /api/v1/campaigns/{id}/calls
#[instrument(skip(state, req))]
pub async fn add_calls(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    req: web::Json<AddCallsRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| {
        warn!("Contact upload validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let campaign_id = path.into_inner();
    let contacts: Vec<ContactInput> = req
        .into_inner()
        .contacts
        .into_iter()
        .map(ContactInput::from)
        .collect();

    let inserted = state.admin.add_calls(campaign_id, contacts).await?;
    info!(%campaign_id, inserted, "Contacts added");

    Ok(HttpResponse::Created().json(ApiResponse::success(AddCallsResponse {
        campaign_id,
        inserted,
    })))
}

/// Run the scheduling loop now
///
/// POST /api/v1/campaigns/{id}/run
#[instrument(skip(state))]
pub async fn run_campaign(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let campaign_id = path.into_inner();
    let launched = state.admin.run(campaign_id).await?;

    Ok(HttpResponse::Accepted().json(ApiResponse::success(RunCampaignResponse {
        campaign_id,
        launched,
    })))
}

/// Configure campaign routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/campaigns")
            .route("/{id}/start", web::post().to(start_campaign))
            .route("/{id}/stop", web::post().to(stop_campaign))
            .route("/{id}/calls", web::post().to(add_calls))
            .route("/{id}/run", web::post().to(run_campaign)),
    );
}
