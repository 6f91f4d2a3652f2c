//! Fixed-time outbound calls
//!
//! A scheduled call is placed once, at or after its `call_at`, either by the
//! fleet poller sweep or by an explicit trigger. Its status moves
//! Scheduled → InProcess → Completed, or to Failed with a reason.

use callflow_core::{
    models::{CallLog, CallType, EndCallNotification, NewCallLog, ScheduledCall, ScheduledCallStatus},
    telephony::{EndCallNotifier, PlaceCall, ProviderSet, WebhookUrls},
    traits::{CallLogRepository, ScheduledCallRepository},
    AppError, AppResult, Clock,
};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::constants::{CALL_ALREADY_INITIATED, SCHEDULED_OUTBOUND, SUBSCRIPTION_LIMIT_REACHED};
use crate::quota::{QuotaDecision, QuotaGate};

pub struct ScheduledCallService {
    scheduled_calls: Arc<dyn ScheduledCallRepository>,
    call_logs: Arc<dyn CallLogRepository>,
    quota: Arc<QuotaGate>,
    providers: ProviderSet,
    urls: WebhookUrls,
    notifier: Arc<dyn EndCallNotifier>,
    clock: Arc<dyn Clock>,
    call_time_limit_secs: u32,
}

impl ScheduledCallService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        scheduled_calls: Arc<dyn ScheduledCallRepository>,
        call_logs: Arc<dyn CallLogRepository>,
        quota: Arc<QuotaGate>,
        providers: ProviderSet,
        urls: WebhookUrls,
        notifier: Arc<dyn EndCallNotifier>,
        clock: Arc<dyn Clock>,
        call_time_limit_secs: u32,
    ) -> Self {
        Self {
            scheduled_calls,
            call_logs,
            quota,
            providers,
            urls,
            notifier,
            clock,
            call_time_limit_secs,
        }
    }

    /// Place one scheduled call now
    #[instrument(skip(self))]
    pub async fn place(&self, id: Uuid) -> AppResult<CallLog> {
        let scheduled = self
            .scheduled_calls
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::ScheduledCallNotFound(id.to_string()))?;

        if scheduled.status != ScheduledCallStatus::Scheduled {
            return Err(AppError::Conflict(CALL_ALREADY_INITIATED.to_string()));
        }

        if let QuotaDecision::Denied(denial) = self.quota.check(scheduled.organisation_id).await? {
            self.scheduled_calls
                .transition(
                    id,
                    ScheduledCallStatus::Scheduled,
                    ScheduledCallStatus::Failed,
                    Some(SUBSCRIPTION_LIMIT_REACHED),
                )
                .await?;
            return Err(AppError::QuotaExceeded(denial.to_string()));
        }

        let provider = self.providers.get(scheduled.provider)?;

        let claimed = self
            .scheduled_calls
            .transition(
                id,
                ScheduledCallStatus::Scheduled,
                ScheduledCallStatus::InProcess,
                None,
            )
            .await?;
        if !claimed {
            return Err(AppError::Conflict(CALL_ALREADY_INITIATED.to_string()));
        }

        let call_logs_id = Uuid::new_v4();
        let request = PlaceCall {
            from: scheduled.from_number.clone(),
            to: scheduled.to_number.clone(),
            answer_url: self
                .urls
                .answer_url(scheduled.provider, SCHEDULED_OUTBOUND, call_logs_id),
            hangup_url: self
                .urls
                .hangup_url(scheduled.provider, SCHEDULED_OUTBOUND, call_logs_id),
            time_limit_secs: self.call_time_limit_secs,
        };

        let request_uuid = match provider.create_call(&request).await {
            Ok(request_uuid) => request_uuid,
            Err(e) => {
                warn!("Placing scheduled call {} failed: {}", id, e);
                self.scheduled_calls
                    .transition(
                        id,
                        ScheduledCallStatus::InProcess,
                        ScheduledCallStatus::Failed,
                        Some(&e.to_string()),
                    )
                    .await?;
                return Err(e);
            }
        };

        let log = self
            .call_logs
            .create(&NewCallLog {
                call_logs_id,
                call_type: CallType::ScheduledOutbound,
                customer_id: scheduled.id.to_string(),
                request_uuid,
                provider: scheduled.provider,
                to_number: scheduled.to_number.clone(),
                from_number: scheduled.from_number.clone(),
                organisation_id: scheduled.organisation_id,
                agent_id: scheduled.agent_id,
                usecase_id: None,
            })
            .await
            .map_err(|e| {
                error!("Scheduled call {} placed but not logged: {}", id, e);
                e
            })?;

        info!(
            "Scheduled call {} placed to {} as {}",
            id, scheduled.to_number, log.request_uuid
        );
        Ok(log)
    }

    /// Place every due scheduled call, up to `limit`. Returns how many were
    /// placed; individual failures are logged.
    pub async fn place_due(&self, limit: i64) -> AppResult<usize> {
        let due = self.scheduled_calls.find_due(self.clock.now(), limit).await?;
        if due.is_empty() {
            return Ok(0);
        }

        debug!("{} scheduled calls due", due.len());

        let mut placed = 0;
        for scheduled in due {
            match self.place(scheduled.id).await {
                Ok(_) => placed += 1,
                Err(e) if e.is_datastore() => return Err(e),
                Err(e) => warn!("Scheduled call {} not placed: {}", scheduled.id, e),
            }
        }

        Ok(placed)
    }

    /// Tell the scheduled call's end-call URL about the hangup reconciled
    /// on `log`
    #[instrument(skip(self, log), fields(call_logs_id = %log.call_logs_id))]
    pub async fn notify_completed(&self, log: &CallLog) -> AppResult<()> {
        let Ok(id) = Uuid::parse_str(&log.customer_id) else {
            warn!(
                "Call log {} has no scheduled call id ({})",
                log.call_logs_id, log.customer_id
            );
            return Ok(());
        };

        let Some(scheduled) = self.scheduled_calls.find_by_id(id).await? else {
            debug!("Scheduled call {} is gone, nothing to notify", id);
            return Ok(());
        };

        self.notify_end(&scheduled, log).await;
        Ok(())
    }

    async fn notify_end(&self, scheduled: &ScheduledCall, log: &CallLog) {
        let Some(url) = scheduled.end_call_url.as_deref().filter(|u| !u.is_empty()) else {
            return;
        };

        let payload = EndCallNotification {
            call_id: scheduled.id,
            call_logs_id: log.call_logs_id,
            to_number: scheduled.to_number.clone(),
            from_number: scheduled.from_number.clone(),
            agent_id: scheduled.agent_id,
            hangup_cause: log.hangup_cause.clone().unwrap_or_default(),
            duration: log.duration_billed.unwrap_or(0),
            conversation_id: log.conversation_id.clone(),
        };

        if let Err(e) = self.notifier.notify(url, &payload).await {
            error!(
                "End-call notification for scheduled call {} failed: {}",
                scheduled.id, e
            );
        }
    }
}
