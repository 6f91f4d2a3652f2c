//! Twilio call provider
//!
//! Calls are created with a form-encoded POST to `Accounts/{sid}/Calls.json`.
//! The status callback is requested only for the `completed` event, which is
//! what the hangup webhook receives.

use async_trait::async_trait;
use callflow_core::config::TwilioConfig;
use callflow_core::models::ProviderKind;
use callflow_core::telephony::{
    AnswerDocument, AnswerReport, CallProvider, HangupReport, PlaceCall, WebhookForm,
    NORMAL_HANGUP,
};
use callflow_core::{AppError, AppResult};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, error, instrument};

use crate::form;

pub struct TwilioProvider {
    http_client: Client,
    config: TwilioConfig,
}

#[derive(Debug, Deserialize)]
struct CreateCallResponse {
    sid: String,
}

impl TwilioProvider {
    pub fn new(http_client: Client, config: TwilioConfig) -> Self {
        Self {
            http_client,
            config,
        }
    }

    fn calls_url(&self) -> String {
        format!(
            "{}/Accounts/{}/Calls.json",
            self.config.api_base.trim_end_matches('/'),
            self.config.account_sid
        )
    }
}

#[async_trait]
impl CallProvider for TwilioProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Twilio
    }

    #[instrument(skip(self, request), fields(to = %request.to, from = %request.from))]
    async fn create_call(&self, request: &PlaceCall) -> AppResult<String> {
        let time_limit = request.time_limit_secs.to_string();
        let params = [
            ("To", request.to.as_str()),
            ("From", request.from.as_str()),
            ("Url", request.answer_url.as_str()),
            ("Method", "POST"),
            ("StatusCallback", request.hangup_url.as_str()),
            ("StatusCallbackEvent", "completed"),
            ("StatusCallbackMethod", "POST"),
            ("TimeLimit", time_limit.as_str()),
        ];

        let response = self
            .http_client
            .post(self.calls_url())
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                error!("Twilio request failed: {}", e);
                AppError::Provider(format!("Twilio request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Twilio rejected call: status={} body={}", status, body);
            return Err(AppError::ProviderRejected(form::error_message(&body)));
        }

        let created: CreateCallResponse = response.json().await.map_err(|e| {
            AppError::Provider(format!("Invalid Twilio response: {}", e))
        })?;

        debug!("Twilio call created: {}", created.sid);
        Ok(created.sid)
    }

    fn answer_response(&self, stream_url: &str) -> AnswerDocument {
        AnswerDocument {
            content_type: "application/xml",
            body: format!(
                r#"<?xml version="1.0" encoding="UTF-8"?><Response><Connect><Stream url="{}" /></Connect></Response>"#,
                stream_url
            ),
        }
    }

    fn parse_hangup(&self, form: &WebhookForm) -> AppResult<HangupReport> {
        let call_sid = form::required(form, "CallSid")?;
        let call_status = form::optional(form, "CallStatus").unwrap_or("unknown");

        // Duration is reported in whole minutes
        let duration_billed = form::number(form, "Duration") * 60;

        let hangup_cause = if call_status == "completed" {
            NORMAL_HANGUP
        } else {
            "Busy"
        };

        Ok(HangupReport {
            provider_call_id: call_sid.to_string(),
            hangup_cause: hangup_cause.to_string(),
            duration_billed,
        })
    }

    fn parse_answer(&self, form: &WebhookForm) -> AppResult<AnswerReport> {
        Ok(AnswerReport {
            provider_call_id: form::required(form, "CallSid")?.to_string(),
            from_number: form::optional(form, "From").unwrap_or("Unknown").to_string(),
            to_number: form::required(form, "To")?.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> TwilioProvider {
        TwilioProvider::new(
            Client::new(),
            TwilioConfig {
                account_sid: "AC123".to_string(),
                auth_token: "secret".to_string(),
                api_base: "https://api.twilio.com/2010-04-01/".to_string(),
            },
        )
    }

    fn form(pairs: &[(&str, &str)]) -> WebhookForm {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_calls_url() {
        assert_eq!(
            provider().calls_url(),
            "https://api.twilio.com/2010-04-01/Accounts/AC123/Calls.json"
        );
    }

    #[test]
    fn test_completed_hangup_is_normal() {
        let report = provider()
            .parse_hangup(&form(&[
                ("CallSid", "CA1"),
                ("CallStatus", "completed"),
                ("Duration", "2"),
            ]))
            .unwrap();

        assert_eq!(report.provider_call_id, "CA1");
        assert!(report.is_normal());
        assert_eq!(report.duration_billed, 120);
    }

    #[test]
    fn test_other_status_is_busy() {
        let report = provider()
            .parse_hangup(&form(&[("CallSid", "CA2"), ("CallStatus", "no-answer")]))
            .unwrap();

        assert_eq!(report.hangup_cause, "Busy");
        assert_eq!(report.duration_billed, 0);
    }

    #[test]
    fn test_hangup_without_sid_is_rejected() {
        let result = provider().parse_hangup(&form(&[("CallStatus", "completed")]));
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
    }

    #[test]
    fn test_answer_document_streams_media() {
        let doc = provider().answer_response("wss://media.example.com/twilio/inbound/1");
        assert_eq!(doc.content_type, "application/xml");
        assert!(doc
            .body
            .contains(r#"<Connect><Stream url="wss://media.example.com/twilio/inbound/1" /></Connect>"#));
    }
}
