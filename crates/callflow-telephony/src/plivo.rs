//! Plivo call provider

use async_trait::async_trait;
use callflow_core::config::PlivoConfig;
use callflow_core::models::ProviderKind;
use callflow_core::telephony::{
    AnswerDocument, AnswerReport, CallProvider, HangupReport, PlaceCall, WebhookForm,
};
use callflow_core::{AppError, AppResult};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

use crate::form;

/// Answering machines are hung up on after this many milliseconds of detection
const MACHINE_DETECTION_TIME_MS: u32 = 2000;

pub struct PlivoProvider {
    http_client: Client,
    config: PlivoConfig,
}

#[derive(Debug, Serialize)]
struct CreateCallRequest<'a> {
    from: &'a str,
    to: &'a str,
    answer_url: &'a str,
    answer_method: &'static str,
    hangup_url: &'a str,
    hangup_method: &'static str,
    time_limit: u32,
    machine_detection: &'static str,
    machine_detection_time: u32,
}

#[derive(Debug, Deserialize)]
struct CreateCallResponse {
    request_uuid: String,
}

impl PlivoProvider {
    pub fn new(http_client: Client, config: PlivoConfig) -> Self {
        Self {
            http_client,
            config,
        }
    }

    fn calls_url(&self) -> String {
        format!(
            "{}/Account/{}/Call/",
            self.config.api_base.trim_end_matches('/'),
            self.config.auth_id
        )
    }
}

#[async_trait]
impl CallProvider for PlivoProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Plivo
    }

    #[instrument(skip(self, request), fields(to = %request.to, from = %request.from))]
    async fn create_call(&self, request: &PlaceCall) -> AppResult<String> {
        let body = CreateCallRequest {
            from: &request.from,
            to: &request.to,
            answer_url: &request.answer_url,
            answer_method: "POST",
            hangup_url: &request.hangup_url,
            hangup_method: "POST",
            time_limit: request.time_limit_secs,
            machine_detection: "hangup",
            machine_detection_time: MACHINE_DETECTION_TIME_MS,
        };

        let response = self
            .http_client
            .post(self.calls_url())
            .basic_auth(&self.config.auth_id, Some(&self.config.auth_token))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!("Plivo request failed: {}", e);
                AppError::Provider(format!("Plivo request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Plivo rejected call: status={} body={}", status, body);
            return Err(AppError::ProviderRejected(form::error_message(&body)));
        }

        let created: CreateCallResponse = response
            .json()
            .await
            .map_err(|e| AppError::Provider(format!("Invalid Plivo response: {}", e)))?;

        debug!("Plivo call queued: {}", created.request_uuid);
        Ok(created.request_uuid)
    }

    fn answer_response(&self, stream_url: &str) -> AnswerDocument {
        AnswerDocument {
            content_type: "text/xml",
            body: format!(
                r#"<Response><Stream bidirectional="true" contentType="audio/x-l16;rate=8000" keepCallAlive="true">{}</Stream></Response>"#,
                stream_url
            ),
        }
    }

    fn parse_hangup(&self, form: &WebhookForm) -> AppResult<HangupReport> {
        // Outbound calls are logged under the request uuid returned at creation
        let call_id = match form::optional(form, "RequestUUID") {
            Some(id) => id,
            None => form::required(form, "CallUUID")?,
        };

        Ok(HangupReport {
            provider_call_id: call_id.to_string(),
            hangup_cause: form::optional(form, "HangupCauseName")
                .unwrap_or("Unknown")
                .to_string(),
            duration_billed: form::number(form, "BillDuration"),
        })
    }

    fn parse_answer(&self, form: &WebhookForm) -> AppResult<AnswerReport> {
        Ok(AnswerReport {
            provider_call_id: form::required(form, "CallUUID")?.to_string(),
            from_number: form::optional(form, "From").unwrap_or("Unknown").to_string(),
            to_number: form::required(form, "To")?.to_string(),
        })
    }
}
