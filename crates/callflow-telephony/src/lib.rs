//! callflow Telephony Providers
//!
//! HTTP clients for the telephony providers callflow places calls through,
//! plus the end-call webhook notifier used for scheduled calls.
//!
//! - [`TwilioProvider`]: form-encoded REST API, TwiML answer documents
//! - [`PlivoProvider`]: JSON REST API, Plivo XML answer documents
//! - [`HttpEndCallNotifier`]: POSTs call results to tenant webhooks

mod form;
pub mod notifier;
pub mod plivo;
pub mod twilio;

pub use notifier::HttpEndCallNotifier;
pub use plivo::PlivoProvider;
pub use twilio::TwilioProvider;

use callflow_core::config::TelephonyConfig;
use callflow_core::telephony::ProviderSet;
use callflow_core::{AppError, AppResult};
use reqwest::{Client, ClientBuilder};
use std::sync::Arc;
use std::time::Duration;

/// Shared HTTP client with the configured timeout
pub fn http_client(timeout_secs: u64) -> AppResult<Client> {
    ClientBuilder::new()
        .timeout(Duration::from_secs(timeout_secs))
        .pool_idle_timeout(Duration::from_secs(90))
        .build()
        .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))
}

/// Build the provider set for every provider with credentials configured
pub fn providers_from_config(config: &TelephonyConfig, client: Client) -> ProviderSet {
    let mut set = ProviderSet::new();

    if !config.twilio.account_sid.is_empty() {
        set = set.with(Arc::new(TwilioProvider::new(
            client.clone(),
            config.twilio.clone(),
        )));
    }

    if !config.plivo.auth_id.is_empty() {
        set = set.with(Arc::new(PlivoProvider::new(client, config.plivo.clone())));
    }

    set
}
