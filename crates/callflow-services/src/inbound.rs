//! Inbound call routing
//!
//! Routes a call dialled into one of an inbound campaign's numbers to the
//! voice agent's media stream.

use callflow_core::{
    models::{CallType, InboundStatus, NewCallLog},
    telephony::{AnswerDocument, AnswerReport, CallProvider, WebhookUrls},
    traits::{CallLogRepository, InboundCampaignRepository},
    AppError, AppResult,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::constants::INBOUND;
use crate::quota::{QuotaDecision, QuotaGate};

pub struct InboundRouter {
    inbound: Arc<dyn InboundCampaignRepository>,
    call_logs: Arc<dyn CallLogRepository>,
    quota: Arc<QuotaGate>,
    urls: WebhookUrls,
}

impl InboundRouter {
    pub fn new(
        inbound: Arc<dyn InboundCampaignRepository>,
        call_logs: Arc<dyn CallLogRepository>,
        quota: Arc<QuotaGate>,
        urls: WebhookUrls,
    ) -> Self {
        Self {
            inbound,
            call_logs,
            quota,
            urls,
        }
    }

    #[instrument(skip(self, provider), fields(to = %report.to_number))]
    pub async fn answer(
        &self,
        provider: &dyn CallProvider,
        report: &AnswerReport,
    ) -> AppResult<AnswerDocument> {
        let campaign = self
            .inbound
            .find_by_phone_number(&report.to_number)
            .await?
            .ok_or_else(|| AppError::NotFound("Campaign phone number not found".to_string()))?;

        if campaign.status != InboundStatus::Running {
            return Err(AppError::Declined(format!(
                "Inbound campaign {} is not running",
                campaign.id
            )));
        }

        if let QuotaDecision::Denied(denial) = self.quota.check(campaign.organisation_id).await? {
            warn!(
                "Stopping inbound campaign {}: {}",
                campaign.id, denial
            );
            self.inbound
                .set_status(campaign.id, InboundStatus::Stopped)
                .await?;
            return Err(AppError::QuotaExceeded(denial.to_string()));
        }

        let call_logs_id = Uuid::new_v4();
        self.call_logs
            .create(&NewCallLog {
                call_logs_id,
                call_type: CallType::Inbound,
                customer_id: campaign.id.to_string(),
                request_uuid: report.provider_call_id.clone(),
                provider: provider.kind(),
                to_number: report.to_number.clone(),
                from_number: report.from_number.clone(),
                organisation_id: campaign.organisation_id,
                agent_id: campaign.agent_id,
                usecase_id: Some(campaign.id),
            })
            .await?;

        info!(
            "Inbound call {} from {} routed to campaign {}",
            report.provider_call_id, report.from_number, campaign.id
        );

        let stream_url = self.urls.stream_url(provider.kind(), INBOUND, call_logs_id);
        Ok(provider.answer_response(&stream_url))
    }
}
