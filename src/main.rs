//! callflow server
//!
//! Runs the campaign scheduler next to the HTTP API that receives telephony
//! provider webhooks and campaign administration requests.

use actix_web::{middleware, web, App, HttpResponse, HttpServer};
use anyhow::Context;
use callflow_api::{configure_routes, AppState};
use callflow_core::{
    config::LoggingConfig,
    events::TracingEventSink,
    telephony::WebhookUrls,
    AppConfig, SystemClock,
};
use callflow_db::{
    create_pool, run_migrations, PgAgentRepository, PgCallLogRepository, PgCampaignCallRepository,
    PgCampaignRepository, PgInboundCampaignRepository, PgOrganisationRepository,
    PgPhoneLineRepository, PgScheduledCallRepository,
};
use callflow_services::{Engine, EngineContext, Repositories};
use callflow_telephony::{http_client, providers_from_config, HttpEndCallNotifier};
use sqlx::PgPool;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing/logging
fn init_tracing(logging: &LoggingConfig) {
    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| logging.level.clone());

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "callflow={lvl},callflow_api={lvl},callflow_services={lvl},callflow_db={lvl},callflow_telephony={lvl},actix_web=info,sqlx=warn",
            lvl = log_level
        ))
    });

    let registry = tracing_subscriber::registry().with(env_filter);

    if logging.json {
        registry
            .with(fmt::layer().json().with_current_span(true))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .init();
    }
}

fn repositories(pool: &PgPool) -> Repositories {
    let organisations = Arc::new(PgOrganisationRepository::new(pool.clone()));

    Repositories {
        campaigns: Arc::new(PgCampaignRepository::new(pool.clone())),
        calls: Arc::new(PgCampaignCallRepository::new(pool.clone())),
        lines: Arc::new(PgPhoneLineRepository::new(pool.clone())),
        call_logs: Arc::new(PgCallLogRepository::new(pool.clone())),
        organisations: organisations.clone(),
        subscriptions: organisations,
        scheduled_calls: Arc::new(PgScheduledCallRepository::new(pool.clone())),
        inbound: Arc::new(PgInboundCampaignRepository::new(pool.clone())),
        agents: Arc::new(PgAgentRepository::new(pool.clone())),
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;
    init_tracing(&config.logging);

    info!("Starting callflow v{}", env!("CARGO_PKG_VERSION"));

    info!("Connecting to database...");
    let pool = create_pool(&config.database.url, Some(config.database.max_connections)).await?;
    if config.database.run_migrations {
        run_migrations(&pool).await?;
    }

    let client = http_client(config.telephony.request_timeout_secs)?;
    let providers = providers_from_config(&config.telephony, client.clone());
    if providers.is_empty() {
        warn!("No telephony provider configured; calls cannot be placed");
    }

    let shutdown = CancellationToken::new();
    let ctx = EngineContext {
        providers,
        urls: WebhookUrls::new(
            &config.telephony.public_base_url,
            &config.telephony.media_stream_base_url,
        ),
        notifier: Arc::new(HttpEndCallNotifier::new(client)),
        events: Arc::new(TracingEventSink),
        clock: Arc::new(SystemClock),
        scheduler: config.scheduler.clone(),
        call_time_limit_secs: config.telephony.call_time_limit_secs,
        shutdown: shutdown.clone(),
    };

    let (engine, signals) = Engine::build(&repositories(&pool), ctx);

    let scheduler_task = if config.scheduler.enabled {
        info!(
            "Campaign scheduler polling every {}s",
            config.scheduler.poll_interval_secs
        );
        Some(tokio::spawn(engine.scheduler.clone().run(signals)))
    } else {
        warn!("Campaign scheduler disabled");
        None
    };

    let state = web::Data::new(AppState::from(&engine));
    let bind_addr = config.server_addr();
    info!(
        "Starting HTTP server on {} with {} workers",
        bind_addr, config.server.workers
    );

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .app_data(web::QueryConfig::default().error_handler(|err, _req| {
                let error_message = err.to_string();
                actix_web::error::InternalError::from_response(
                    err,
                    HttpResponse::BadRequest().json(serde_json::json!({
                        "error": "invalid_query",
                        "message": error_message,
                        "status": 400,
                    })),
                )
                .into()
            }))
            .wrap(TracingLogger::default())
            .wrap(middleware::NormalizePath::trim())
            .configure(configure_routes)
    })
    .workers(config.server.workers)
    .bind(&bind_addr)?
    .run()
    .await?;

    info!("HTTP server stopped, shutting down scheduler");
    shutdown.cancel();
    if let Some(task) = scheduler_task {
        if let Err(e) = task.await {
            warn!("Scheduler task ended abnormally: {}", e);
        }
    }
    // Loops started through the API run even with the poller disabled
    engine.scheduler.drain().await;

    pool.close().await;
    Ok(())
}
