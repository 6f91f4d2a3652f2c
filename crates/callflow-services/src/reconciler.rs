//! Outcome reconciler
//!
//! Applies a provider's call-termination webhook. The call log is updated
//! once per provider call id; a duplicate or unknown webhook changes
//! nothing. The log update, the closing of the record owning the call and
//! the usage increment are stored together by the call log repository, so
//! a failure leaves the webhook safe to redeliver. Afterwards, by call type:
//!
//! - the campaign is re-signalled for another scheduling iteration
//! - the scheduled call's end-call URL is notified
//! - nothing more happens for inbound calls

use callflow_core::{
    models::{AttemptOutcome, CallLog, CallType},
    telephony::HangupReport,
    traits::CallLogRepository,
    AppResult, Clock,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::scheduled_calls::ScheduledCallService;
use crate::scheduler::ScheduleSignals;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// No call log carries this provider call id
    Unknown,
    /// The call log was already reconciled
    Duplicate,
    Reconciled {
        call_logs_id: Uuid,
        call_type: CallType,
    },
}

pub struct OutcomeReconciler {
    call_logs: Arc<dyn CallLogRepository>,
    scheduled_calls: Arc<ScheduledCallService>,
    signals: ScheduleSignals,
    clock: Arc<dyn Clock>,
}

impl OutcomeReconciler {
    pub fn new(
        call_logs: Arc<dyn CallLogRepository>,
        scheduled_calls: Arc<ScheduledCallService>,
        signals: ScheduleSignals,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            call_logs,
            scheduled_calls,
            signals,
            clock,
        }
    }

    #[instrument(skip(self), fields(provider_call_id = %report.provider_call_id))]
    pub async fn on_hangup(&self, report: &HangupReport) -> AppResult<ReconcileOutcome> {
        if self
            .call_logs
            .find_by_request_uuid(&report.provider_call_id)
            .await?
            .is_none()
        {
            warn!(
                "Hangup for unknown call {} ignored",
                report.provider_call_id
            );
            return Ok(ReconcileOutcome::Unknown);
        }

        let outcome = if report.is_normal() {
            AttemptOutcome::Completed
        } else {
            AttemptOutcome::RetryAfter(self.clock.tomorrow())
        };

        let Some(log) = self
            .call_logs
            .reconcile_hangup(
                &report.provider_call_id,
                &report.hangup_cause,
                report.duration_billed,
                outcome,
            )
            .await?
        else {
            info!(
                "Hangup for call {} already reconciled",
                report.provider_call_id
            );
            return Ok(ReconcileOutcome::Duplicate);
        };

        info!(
            "Call {} ended: {} ({}s billed)",
            log.call_logs_id, report.hangup_cause, report.duration_billed
        );

        match log.call_type {
            CallType::CampaignOutbound => self.resignal(&log),
            CallType::ScheduledOutbound => self.scheduled_calls.notify_completed(&log).await?,
            CallType::Inbound => {}
        }

        Ok(ReconcileOutcome::Reconciled {
            call_logs_id: log.call_logs_id,
            call_type: log.call_type,
        })
    }

    fn resignal(&self, log: &CallLog) {
        if let Some(campaign_id) = log.usecase_id {
            if self.signals.send(campaign_id).is_err() {
                warn!("Scheduler gone; campaign {} not re-signalled", campaign_id);
            }
        }
    }
}
