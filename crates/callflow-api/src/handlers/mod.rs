//! HTTP request handlers

pub mod call;
pub mod call_log;
pub mod campaign;
pub mod health;
pub mod scheduled_call;

use actix_web::web;

/// Mount every route under `/api/v1`
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/health", web::get().to(health::health_check))
            .configure(call::configure)
            .configure(campaign::configure)
            .configure(scheduled_call::configure)
            .configure(call_log::configure),
    );
}
