//! Dispatcher
//!
//! Places one campaign call. The call and its line are claimed together
//! before the provider is contacted; if the provider refuses or does not
//! answer within the placement timeout, the claim is undone with one attempt
//! consumed and a retry date of tomorrow, and no call log is written. A call
//! log exists only for calls the provider accepted.
//!
//! Once the provider accepted a call its claim is never undone here: the
//! call is live and holds its line. If the call log cannot be written after
//! a few attempts the claim stays in place and the call is reported for
//! manual reconciliation.

use callflow_core::{
    events::EventSink,
    models::{CallStatus, CallType, NewCallLog},
    telephony::{PlaceCall, ProviderSet, WebhookUrls},
    traits::{CallLogRepository, CampaignCallRepository, CampaignRepository, PhoneLineRepository},
    AppError, AppResult, Clock,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::availability::{NextCall, Unavailable};
use crate::campaign_admin::stop_campaign;
use crate::constants::{
    CALL_LOG_WRITE_ATTEMPTS, CAMPAIGN_OUTBOUND, DEFAULT_PLACEMENT_TIMEOUT_SECS,
    SUBSCRIPTION_LIMIT_REACHED,
};
use crate::quota::{QuotaDecision, QuotaGate};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The provider accepted the call
    Placed {
        call_id: i64,
        call_logs_id: Uuid,
        request_uuid: String,
    },
    /// The provider refused; the call is back in the backlog
    PlacementFailed { call_id: i64, reason: String },
    /// The call or the line was claimed concurrently; nothing changed
    Skipped { call_id: i64 },
}

pub struct Dispatcher {
    campaigns: Arc<dyn CampaignRepository>,
    calls: Arc<dyn CampaignCallRepository>,
    lines: Arc<dyn PhoneLineRepository>,
    call_logs: Arc<dyn CallLogRepository>,
    quota: Arc<QuotaGate>,
    providers: ProviderSet,
    urls: WebhookUrls,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    call_time_limit_secs: u32,
    placement_timeout: Duration,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        campaigns: Arc<dyn CampaignRepository>,
        calls: Arc<dyn CampaignCallRepository>,
        lines: Arc<dyn PhoneLineRepository>,
        call_logs: Arc<dyn CallLogRepository>,
        quota: Arc<QuotaGate>,
        providers: ProviderSet,
        urls: WebhookUrls,
        events: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
        call_time_limit_secs: u32,
    ) -> Self {
        Self {
            campaigns,
            calls,
            lines,
            call_logs,
            quota,
            providers,
            urls,
            events,
            clock,
            call_time_limit_secs,
            placement_timeout: Duration::from_secs(DEFAULT_PLACEMENT_TIMEOUT_SECS),
        }
    }

    pub fn with_placement_timeout(mut self, timeout: Duration) -> Self {
        self.placement_timeout = timeout;
        self
    }

    /// Claim the selected call and line, then place the call
    #[instrument(skip(self, next), fields(call_id = next.call.id, line = %next.line.phone_number))]
    pub async fn dispatch(&self, next: &NextCall) -> AppResult<DispatchOutcome> {
        let call = &next.call;
        let line = &next.line;

        // Resolved before claiming so a missing provider mutates nothing
        let provider = self.providers.get(line.provider)?;

        let claimed = self
            .calls
            .begin_attempt(call.id, call.campaign_id, &line.phone_number)
            .await?;
        if !claimed {
            info!("Call {} or line {} already taken", call.id, line.phone_number);
            return Ok(DispatchOutcome::Skipped { call_id: call.id });
        }

        let call_logs_id = Uuid::new_v4();
        let request = PlaceCall {
            from: line.phone_number.clone(),
            to: call.phone_number.clone(),
            answer_url: self
                .urls
                .answer_url(line.provider, CAMPAIGN_OUTBOUND, call_logs_id),
            hangup_url: self
                .urls
                .hangup_url(line.provider, CAMPAIGN_OUTBOUND, call_logs_id),
            time_limit_secs: self.call_time_limit_secs,
        };

        let placed = tokio::time::timeout(self.placement_timeout, provider.create_call(&request))
            .await
            .unwrap_or_else(|_| {
                Err(AppError::Provider(format!(
                    "no answer from {} within {:?}",
                    line.provider, self.placement_timeout
                )))
            });

        let request_uuid = match placed {
            Ok(request_uuid) => request_uuid,
            Err(e) => {
                warn!("Placing call {} failed: {}", call.id, e);
                self.calls
                    .abort_attempt(call.id, self.clock.tomorrow())
                    .await?;
                return Ok(DispatchOutcome::PlacementFailed {
                    call_id: call.id,
                    reason: e.to_string(),
                });
            }
        };

        let log = NewCallLog {
            call_logs_id,
            call_type: CallType::CampaignOutbound,
            customer_id: call.id.to_string(),
            request_uuid: request_uuid.clone(),
            provider: line.provider,
            to_number: call.phone_number.clone(),
            from_number: line.phone_number.clone(),
            organisation_id: next.campaign.organisation_id,
            agent_id: next.campaign.agent_id,
            usecase_id: Some(next.campaign.id),
        };

        if let Err(e) = self.write_log(&log).await {
            // The call is live; its line stays held until someone reconciles it
            error!(
                "Call {} placed as {} from {} but not logged, needs manual reconciliation: {}",
                call.id, request_uuid, line.phone_number, e
            );
            return Err(e);
        }

        info!(
            "Call {} placed from {} as {}",
            call.id, line.phone_number, request_uuid
        );

        Ok(DispatchOutcome::Placed {
            call_id: call.id,
            call_logs_id,
            request_uuid,
        })
    }

    async fn write_log(&self, log: &NewCallLog) -> AppResult<()> {
        let mut attempt = 1;
        loop {
            match self.call_logs.create(log).await {
                Ok(_) => return Ok(()),
                Err(e) if e.is_datastore() && attempt < CALL_LOG_WRITE_ATTEMPTS => {
                    warn!(
                        "Writing call log {} failed (attempt {}): {}",
                        log.request_uuid, attempt, e
                    );
                    tokio::time::sleep(Duration::from_millis(200 * u64::from(attempt))).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Place one specific campaign call on demand.
    ///
    /// Checks the organisation quota first, stopping the campaign when it is
    /// exhausted, then takes the first free line of the campaign.
    #[instrument(skip(self))]
    pub async fn place_call(&self, call_id: i64) -> AppResult<DispatchOutcome> {
        let call = self
            .calls
            .find_by_id(call_id)
            .await?
            .ok_or_else(|| AppError::CallNotFound(call_id.to_string()))?;

        let campaign = self
            .campaigns
            .find_by_id(call.campaign_id)
            .await?
            .ok_or_else(|| AppError::CampaignNotFound(call.campaign_id.to_string()))?;

        if let QuotaDecision::Denied(denial) = self.quota.check(campaign.organisation_id).await? {
            stop_campaign(
                self.campaigns.as_ref(),
                self.events.as_ref(),
                &campaign,
                SUBSCRIPTION_LIMIT_REACHED,
            )
            .await?;
            return Err(AppError::QuotaExceeded(denial.to_string()));
        }

        if call.status != CallStatus::NotInitiated {
            return Err(AppError::Conflict(format!(
                "Call {} is {}",
                call_id, call.status
            )));
        }
        if call.retry <= 0 {
            return Err(AppError::Declined(format!("Call {} is out of retry", call_id)));
        }

        let line = self
            .lines
            .list_available(campaign.id)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Declined(Unavailable::NoLineAvailable.to_string()))?;

        self.dispatch(&NextCall {
            campaign,
            call,
            line,
        })
        .await
    }
}
