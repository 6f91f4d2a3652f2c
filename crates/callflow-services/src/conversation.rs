//! Conversation lifecycle
//!
//! Serves the voice engine: the context it needs when a call connects and
//! the record it hands back when the conversation ends.

use callflow_core::{
    models::{CallLog, CallType, ConversationContext, ConversationRecord},
    telephony::{AnswerDocument, CallProvider, WebhookUrls},
    traits::{AgentRepository, CallLogRepository, CampaignCallRepository, ScheduledCallRepository},
    AppError, AppResult,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

pub struct ConversationService {
    call_logs: Arc<dyn CallLogRepository>,
    agents: Arc<dyn AgentRepository>,
    calls: Arc<dyn CampaignCallRepository>,
    scheduled_calls: Arc<dyn ScheduledCallRepository>,
    urls: WebhookUrls,
}

impl ConversationService {
    pub fn new(
        call_logs: Arc<dyn CallLogRepository>,
        agents: Arc<dyn AgentRepository>,
        calls: Arc<dyn CampaignCallRepository>,
        scheduled_calls: Arc<dyn ScheduledCallRepository>,
        urls: WebhookUrls,
    ) -> Self {
        Self {
            call_logs,
            agents,
            calls,
            scheduled_calls,
            urls,
        }
    }

    /// Answer document for an outbound call placed by this service.
    ///
    /// The call log may not be written yet when the provider answers, so it
    /// is not looked up here.
    pub fn answer_outbound(
        &self,
        provider: &dyn CallProvider,
        call_type: CallType,
        call_logs_id: Uuid,
    ) -> AnswerDocument {
        let stream_url = self
            .urls
            .stream_url(provider.kind(), &call_type.to_string(), call_logs_id);
        provider.answer_response(&stream_url)
    }

    #[instrument(skip(self, record))]
    pub async fn record_conversation(
        &self,
        call_logs_id: Uuid,
        record: &ConversationRecord,
    ) -> AppResult<()> {
        if !self
            .call_logs
            .record_conversation(call_logs_id, record)
            .await?
        {
            return Err(AppError::CallLogNotFound(call_logs_id.to_string()));
        }

        info!(
            "Conversation {} recorded on call {}",
            record.conversation_id, call_logs_id
        );
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn conversation_context(&self, call_logs_id: Uuid) -> AppResult<ConversationContext> {
        let log = self
            .call_logs
            .find_by_id(call_logs_id)
            .await?
            .ok_or_else(|| AppError::CallLogNotFound(call_logs_id.to_string()))?;

        let agent = self
            .agents
            .find_by_id(log.agent_id)
            .await?
            .ok_or_else(|| AppError::AgentNotFound(log.agent_id.to_string()))?;

        let dynamic_variables = self.dynamic_variables(&log).await?;

        Ok(ConversationContext {
            call_logs_id,
            agent,
            to_number: log.to_number,
            from_number: log.from_number,
            dynamic_variables,
        })
    }

    async fn dynamic_variables(&self, log: &CallLog) -> AppResult<Value> {
        let data = match log.call_type {
            CallType::CampaignOutbound => match log.customer_id.parse::<i64>() {
                Ok(call_id) => self.calls.find_by_id(call_id).await?.map(|c| c.data),
                Err(_) => None,
            },
            CallType::ScheduledOutbound => match Uuid::parse_str(&log.customer_id) {
                Ok(id) => self.scheduled_calls.find_by_id(id).await?.map(|s| s.data),
                Err(_) => None,
            },
            CallType::Inbound => Some(json!({
                "caller_number": log.from_number,
                "dialled_number": log.to_number,
            })),
        };

        match data {
            Some(value) if value.is_object() => Ok(value),
            Some(other) => {
                debug!("Call {} payload is not an object", log.call_logs_id);
                Ok(json!({ "data": other }))
            }
            None => Ok(json!({})),
        }
    }
}
