//! End-call webhook delivery

use async_trait::async_trait;
use callflow_core::models::EndCallNotification;
use callflow_core::telephony::EndCallNotifier;
use callflow_core::{AppError, AppResult};
use reqwest::Client;
use tracing::{debug, instrument, warn};

pub struct HttpEndCallNotifier {
    http_client: Client,
}

impl HttpEndCallNotifier {
    pub fn new(http_client: Client) -> Self {
        Self { http_client }
    }
}

#[async_trait]
impl EndCallNotifier for HttpEndCallNotifier {
    #[instrument(skip(self, payload), fields(call_id = %payload.call_id))]
    async fn notify(&self, url: &str, payload: &EndCallNotification) -> AppResult<()> {
        let response = self
            .http_client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|e| AppError::Provider(format!("End call webhook failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            warn!("End call webhook {} answered {}", url, status);
            return Err(AppError::Provider(format!(
                "End call webhook answered {}",
                status
            )));
        }

        debug!("End call webhook delivered to {}", url);
        Ok(())
    }
}
