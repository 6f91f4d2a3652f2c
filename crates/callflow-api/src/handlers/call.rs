//! Call handlers
//!
//! On-demand placement of a campaign call and the provider webhooks. The
//! answer and hangup URLs carry `provider` and `type` in the query string;
//! the provider posts its own form body.

use actix_web::{web, HttpResponse};
use callflow_core::{
    models::CallType,
    telephony::{AnswerDocument, WebhookForm},
    AppError,
};
use tracing::{debug, info, instrument, warn};
use validator::Validate;

use crate::dto::{ApiResponse, HangupResponse, TriggerCallRequest, TriggerCallResponse, WebhookQuery};
use crate::state::AppState;

/// Place one campaign call now
///
/// POST /api/v1/call/trigger
#[instrument(skip(state, req))]
pub async fn trigger_call(
    state: web::Data<AppState>,
    req: web::Json<TriggerCallRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| {
        warn!("Trigger validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    debug!(call_id = req.call_id, "Triggering call");

    let outcome = state.dispatcher.place_call(req.call_id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(TriggerCallResponse::from(outcome))))
}

/// Answer webhook: returns the provider document that connects the call to
/// the voice agent's media stream
///
/// POST /api/v1/call/answer?provider=..&type=..&call_logs_id=..
#[instrument(skip(state, form), fields(provider = %query.provider, call_type = %query.call_type))]
pub async fn answer_call(
    state: web::Data<AppState>,
    query: web::Query<WebhookQuery>,
    form: web::Form<WebhookForm>,
) -> Result<HttpResponse, AppError> {
    query
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let provider = state.providers.by_name(&query.provider)?;
    let call_type = CallType::from_str(&query.call_type)
        .ok_or_else(|| AppError::InvalidInput(format!("Unknown call type {}", query.call_type)))?;

    let document = match call_type {
        CallType::Inbound => {
            let report = provider.parse_answer(&form)?;
            state.inbound.answer(&*provider, &report).await?
        }
        CallType::CampaignOutbound | CallType::ScheduledOutbound => {
            let call_logs_id = query.call_logs_id.ok_or_else(|| {
                AppError::InvalidInput("call_logs_id is required for outbound calls".to_string())
            })?;
            state
                .conversation
                .answer_outbound(&*provider, call_type, call_logs_id)
        }
    };

    Ok(xml_response(document))
}

/// Hangup webhook
///
/// POST /api/v1/call/hangup?provider=..&type=..
#[instrument(skip(state, form), fields(provider = %query.provider))]
pub async fn hangup_call(
    state: web::Data<AppState>,
    query: web::Query<WebhookQuery>,
    form: web::Form<WebhookForm>,
) -> Result<HttpResponse, AppError> {
    let provider = state.providers.by_name(&query.provider)?;
    let report = provider.parse_hangup(&form)?;

    let outcome = state.reconciler.on_hangup(&report).await?;
    info!(
        provider_call_id = %report.provider_call_id,
        cause = %report.hangup_cause,
        "Hangup processed: {:?}",
        outcome
    );

    Ok(HttpResponse::Ok().json(HangupResponse::from(outcome)))
}

fn xml_response(document: AnswerDocument) -> HttpResponse {
    HttpResponse::Ok()
        .content_type(document.content_type)
        .body(document.body)
}

/// Configure call routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/call")
            .route("/trigger", web::post().to(trigger_call))
            .route("/answer", web::post().to(answer_call))
            .route("/hangup", web::post().to(hangup_call)),
    );
}
