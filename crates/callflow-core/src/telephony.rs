//! Telephony provider abstraction
//!
//! Each provider (Twilio, Plivo) places calls over its REST API, renders the
//! XML document returned to its answer webhook and knows how to read its own
//! webhook forms. A provider is resolved once per call from the line it is
//! placed on and then passed by reference.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{EndCallNotification, ProviderKind};
use crate::AppResult;

/// Hangup cause that completes a contact
pub const NORMAL_HANGUP: &str = "Normal Hangup";

/// Raw `application/x-www-form-urlencoded` webhook body
pub type WebhookForm = HashMap<String, String>;

/// Request to place one outbound call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceCall {
    pub from: String,
    pub to: String,
    pub answer_url: String,
    pub hangup_url: String,
    pub time_limit_secs: u32,
}

/// Response body for the provider's answer webhook
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerDocument {
    pub content_type: &'static str,
    pub body: String,
}

/// Normalised call-termination webhook
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HangupReport {
    pub provider_call_id: String,
    pub hangup_cause: String,
    /// Billed duration as reported by the provider
    pub duration_billed: i64,
}

impl HangupReport {
    pub fn is_normal(&self) -> bool {
        self.hangup_cause == NORMAL_HANGUP
    }
}

/// Normalised answer webhook for inbound calls
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerReport {
    pub provider_call_id: String,
    pub from_number: String,
    pub to_number: String,
}

#[async_trait]
pub trait CallProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Place a call, returning the provider's call identifier
    async fn create_call(&self, request: &PlaceCall) -> AppResult<String>;

    /// Document that connects the answered call to the media stream
    fn answer_response(&self, stream_url: &str) -> AnswerDocument;

    fn parse_hangup(&self, form: &WebhookForm) -> AppResult<HangupReport>;

    fn parse_answer(&self, form: &WebhookForm) -> AppResult<AnswerReport>;
}

/// Providers available to this process, keyed by kind
#[derive(Clone, Default)]
pub struct ProviderSet {
    providers: HashMap<ProviderKind, Arc<dyn CallProvider>>,
}

impl ProviderSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn with(mut self, provider: Arc<dyn CallProvider>) -> Self {
        self.providers.insert(provider.kind(), provider);
        self
    }

    pub fn get(&self, kind: ProviderKind) -> AppResult<Arc<dyn CallProvider>> {
        self.providers
            .get(&kind)
            .cloned()
            .ok_or_else(|| AppError::UnknownProvider(kind.to_string()))
    }

    /// Resolve a provider from a webhook query parameter
    pub fn by_name(&self, name: &str) -> AppResult<Arc<dyn CallProvider>> {
        let kind =
            ProviderKind::from_str(name).ok_or_else(|| AppError::UnknownProvider(name.to_string()))?;
        self.get(kind)
    }
}

/// Delivers scheduled-call results to the tenant's `end_call_url`
#[async_trait]
pub trait EndCallNotifier: Send + Sync {
    async fn notify(&self, url: &str, payload: &EndCallNotification) -> AppResult<()>;
}

/// Builds the webhook and media-stream URLs embedded in placed calls
#[derive(Debug, Clone)]
pub struct WebhookUrls {
    public_base_url: String,
    media_stream_base_url: String,
}

impl WebhookUrls {
    pub fn new(public_base_url: impl Into<String>, media_stream_base_url: impl Into<String>) -> Self {
        Self {
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
            media_stream_base_url: media_stream_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn answer_url(&self, provider: ProviderKind, call_type: &str, call_logs_id: Uuid) -> String {
        format!(
            "{}/api/v1/call/answer?provider={}&type={}&call_logs_id={}",
            self.public_base_url, provider, call_type, call_logs_id
        )
    }

    pub fn hangup_url(&self, provider: ProviderKind, call_type: &str, call_logs_id: Uuid) -> String {
        format!(
            "{}/api/v1/call/hangup?provider={}&type={}&call_logs_id={}",
            self.public_base_url, provider, call_type, call_logs_id
        )
    }

    pub fn stream_url(&self, provider: ProviderKind, call_type: &str, call_logs_id: Uuid) -> String {
        format!(
            "{}/{}/{}/{}",
            self.media_stream_base_url, provider, call_type, call_logs_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webhook_urls_embed_call_log() {
        let urls = WebhookUrls::new("https://calls.example.com/", "wss://media.example.com");
        let id = Uuid::nil();

        assert_eq!(
            urls.hangup_url(ProviderKind::Plivo, "campaign_outbound", id),
            format!(
                "https://calls.example.com/api/v1/call/hangup?provider=plivo&type=campaign_outbound&call_logs_id={}",
                id
            )
        );
        assert_eq!(
            urls.stream_url(ProviderKind::Twilio, "inbound", id),
            format!("wss://media.example.com/twilio/inbound/{}", id)
        );
    }

    #[test]
    fn test_empty_provider_set() {
        let set = ProviderSet::new();
        assert!(matches!(
            set.get(ProviderKind::Twilio),
            Err(AppError::UnknownProvider(_))
        ));
        assert!(matches!(set.by_name("nope"), Err(AppError::UnknownProvider(_))));
    }
}
