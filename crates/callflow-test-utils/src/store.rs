//! In-memory datastore
//!
//! Every conditional update checks and writes under one lock, which gives
//! the same all-or-nothing behaviour as the transactional SQL.

use async_trait::async_trait;
use callflow_core::{
    models::{
        Agent, AttemptOutcome, CallLog, CallStatus, CallType, Campaign, CampaignCall, CampaignStatus,
        ConversationRecord, InboundCampaign, InboundStatus, LineStatus, NewCallLog,
        NewCampaignCall, OrganisationUsage, PhoneLine, ScheduledCall, ScheduledCallStatus,
        Subscription,
    },
    traits::{
        AgentRepository, CallLogRepository, CampaignCallRepository, CampaignRepository,
        InboundCampaignRepository, OrganisationRepository, PhoneLineRepository,
        ScheduledCallRepository, SubscriptionRepository,
    },
    AppError,
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use uuid::Uuid;

#[derive(Debug, Default, Clone)]
struct State {
    organisations: HashMap<Uuid, OrganisationUsage>,
    subscriptions: HashMap<Uuid, Subscription>,
    campaigns: HashMap<Uuid, Campaign>,
    calls: BTreeMap<i64, CampaignCall>,
    next_call_id: i64,
    lines: Vec<PhoneLine>,
    call_logs: Vec<CallLog>,
    scheduled_calls: HashMap<Uuid, ScheduledCall>,
    inbound: HashMap<Uuid, InboundCampaign>,
    agents: HashMap<Uuid, Agent>,
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
    line_lookups: AtomicUsize,
    usage_unavailable: AtomicBool,
    failing_usage_updates: AtomicUsize,
    failing_log_writes: AtomicUsize,
}

/// Consume one injected failure, if any are left
fn take_failure(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl State {
    fn close_attempt(
        &mut self,
        call_id: i64,
        status: CallStatus,
        retry_after: Option<NaiveDate>,
    ) -> bool {
        let State { calls, lines, .. } = self;

        let Some(call) = calls.get_mut(&call_id) else {
            return false;
        };
        if call.status != CallStatus::InProcess {
            return false;
        }

        call.retry = (call.retry - 1).max(0);
        call.total_calls += 1;
        call.status = status;
        if let Some(date) = retry_after {
            call.next_possible_call_date = date;
        }
        call.updated_at = Utc::now();

        if let Some(line) = lines.iter_mut().find(|l| {
            l.campaign_id == call.campaign_id && Some(&l.phone_number) == call.from_number.as_ref()
        }) {
            line.status = LineStatus::Available;
        }

        true
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ===== Seeding =====

    pub fn add_organisation(&self, usage: OrganisationUsage, subscription: Option<Subscription>) {
        let mut state = self.state.lock();
        if let Some(subscription) = subscription {
            state
                .subscriptions
                .insert(subscription.organisation_id, subscription);
        }
        state.organisations.insert(usage.organisation_id, usage);
    }

    pub fn set_subscription(&self, subscription: Subscription) {
        self.state
            .lock()
            .subscriptions
            .insert(subscription.organisation_id, subscription);
    }

    pub fn add_campaign(&self, campaign: Campaign) {
        self.state.lock().campaigns.insert(campaign.id, campaign);
    }

    pub fn set_campaign_status(&self, id: Uuid, status: CampaignStatus) {
        if let Some(campaign) = self.state.lock().campaigns.get_mut(&id) {
            campaign.status = status;
        }
    }

    /// Insert a campaign call, assigning its id
    pub fn add_call(&self, mut call: CampaignCall) -> i64 {
        let mut state = self.state.lock();
        state.next_call_id += 1;
        call.id = state.next_call_id;
        let id = call.id;
        state.calls.insert(id, call);
        id
    }

    pub fn add_line(&self, line: PhoneLine) {
        self.state.lock().lines.push(line);
    }

    pub fn add_agent(&self, agent: Agent) {
        self.state.lock().agents.insert(agent.id, agent);
    }

    pub fn add_scheduled_call(&self, call: ScheduledCall) {
        self.state.lock().scheduled_calls.insert(call.id, call);
    }

    pub fn add_inbound_campaign(&self, campaign: InboundCampaign) {
        self.state.lock().inbound.insert(campaign.id, campaign);
    }

    /// Make usage lookups fail as if the database were down
    pub fn set_usage_unavailable(&self, unavailable: bool) {
        self.usage_unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Fail the next `n` usage increments, rolling back the hangup that
    /// carried them
    pub fn fail_usage_updates(&self, n: usize) {
        self.failing_usage_updates.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` call log inserts
    pub fn fail_call_log_writes(&self, n: usize) {
        self.failing_log_writes.store(n, Ordering::SeqCst);
    }

    // ===== Inspection =====

    pub fn campaign(&self, id: Uuid) -> Option<Campaign> {
        self.state.lock().campaigns.get(&id).cloned()
    }

    pub fn call(&self, id: i64) -> Option<CampaignCall> {
        self.state.lock().calls.get(&id).cloned()
    }

    pub fn calls(&self, campaign_id: Uuid) -> Vec<CampaignCall> {
        self.state
            .lock()
            .calls
            .values()
            .filter(|c| c.campaign_id == campaign_id)
            .cloned()
            .collect()
    }

    pub fn line(&self, campaign_id: Uuid, phone_number: &str) -> Option<PhoneLine> {
        self.state
            .lock()
            .lines
            .iter()
            .find(|l| l.campaign_id == campaign_id && l.phone_number == phone_number)
            .cloned()
    }

    pub fn usage(&self, organisation_id: Uuid) -> Option<OrganisationUsage> {
        self.state.lock().organisations.get(&organisation_id).cloned()
    }

    pub fn call_logs(&self) -> Vec<CallLog> {
        self.state.lock().call_logs.clone()
    }

    pub fn scheduled_call(&self, id: Uuid) -> Option<ScheduledCall> {
        self.state.lock().scheduled_calls.get(&id).cloned()
    }

    pub fn inbound_campaign(&self, id: Uuid) -> Option<InboundCampaign> {
        self.state.lock().inbound.get(&id).cloned()
    }

    /// Number of `list_available` calls served
    pub fn line_lookups(&self) -> usize {
        self.line_lookups.load(Ordering::SeqCst)
    }

    /// Calls in process whose line is not held unavailable
    pub fn lines_out_of_sync(&self) -> Vec<i64> {
        let state = self.state.lock();
        state
            .calls
            .values()
            .filter(|c| c.status == CallStatus::InProcess)
            .filter(|c| {
                let held = state
                    .lines
                    .iter()
                    .filter(|l| {
                        l.campaign_id == c.campaign_id
                            && Some(&l.phone_number) == c.from_number.as_ref()
                            && l.status == LineStatus::Unavailable
                    })
                    .count();
                held != 1
            })
            .map(|c| c.id)
            .collect()
    }

}

#[async_trait]
impl CampaignRepository for InMemoryStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Campaign>, AppError> {
        Ok(self.campaign(id))
    }

    async fn find_runnable(&self, now: NaiveTime) -> Result<Vec<Campaign>, AppError> {
        Ok(self
            .state
            .lock()
            .campaigns
            .values()
            .filter(|c| c.is_running() && c.is_callable_at(now))
            .cloned()
            .collect())
    }

    async fn transition_status(
        &self,
        id: Uuid,
        from: &[CampaignStatus],
        to: CampaignStatus,
    ) -> Result<bool, AppError> {
        let mut state = self.state.lock();
        match state.campaigns.get_mut(&id) {
            Some(campaign) if from.contains(&campaign.status) => {
                campaign.status = to;
                campaign.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl CampaignCallRepository for InMemoryStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<CampaignCall>, AppError> {
        Ok(self.call(id))
    }

    async fn next_eligible(
        &self,
        campaign_id: Uuid,
        today: NaiveDate,
    ) -> Result<Option<CampaignCall>, AppError> {
        let state = self.state.lock();
        let mut eligible: Vec<&CampaignCall> = state
            .calls
            .values()
            .filter(|c| c.campaign_id == campaign_id && c.is_eligible(today))
            .collect();
        eligible.sort_by(|a, b| {
            b.retry
                .cmp(&a.retry)
                .then(a.call_at.cmp(&b.call_at))
                .then(a.id.cmp(&b.id))
        });
        Ok(eligible.first().map(|c| (*c).clone()))
    }

    async fn count_pending(&self, campaign_id: Uuid) -> Result<i64, AppError> {
        Ok(self
            .state
            .lock()
            .calls
            .values()
            .filter(|c| c.campaign_id == campaign_id && c.is_pending())
            .count() as i64)
    }

    async fn insert_batch(
        &self,
        campaign_id: Uuid,
        calls: &[NewCampaignCall],
    ) -> Result<u64, AppError> {
        let now = Utc::now();
        for new in calls {
            self.add_call(CampaignCall {
                id: 0,
                campaign_id,
                phone_number: new.phone_number.clone(),
                status: CallStatus::NotInitiated,
                retry: new.retry,
                total_calls: 0,
                next_possible_call_date: new.next_possible_call_date,
                from_number: None,
                call_at: new.call_at,
                data: new.data.clone(),
                created_at: now,
                updated_at: now,
            });
        }
        Ok(calls.len() as u64)
    }

    async fn begin_attempt(
        &self,
        call_id: i64,
        campaign_id: Uuid,
        from_number: &str,
    ) -> Result<bool, AppError> {
        let mut state = self.state.lock();
        let State { calls, lines, .. } = &mut *state;

        let Some(line) = lines.iter_mut().find(|l| {
            l.campaign_id == campaign_id
                && l.phone_number == from_number
                && l.status == LineStatus::Available
        }) else {
            return Ok(false);
        };

        let Some(call) = calls.get_mut(&call_id).filter(|c| {
            c.campaign_id == campaign_id && c.status == CallStatus::NotInitiated && c.retry > 0
        }) else {
            return Ok(false);
        };

        line.status = LineStatus::Unavailable;
        call.status = CallStatus::InProcess;
        call.from_number = Some(from_number.to_string());
        call.updated_at = Utc::now();
        Ok(true)
    }

    async fn abort_attempt(&self, call_id: i64, retry_after: NaiveDate) -> Result<bool, AppError> {
        Ok(self
            .state
            .lock()
            .close_attempt(call_id, CallStatus::NotInitiated, Some(retry_after)))
    }
}

#[async_trait]
impl PhoneLineRepository for InMemoryStore {
    async fn list_available(&self, campaign_id: Uuid) -> Result<Vec<PhoneLine>, AppError> {
        self.line_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .state
            .lock()
            .lines
            .iter()
            .filter(|l| l.campaign_id == campaign_id && l.status == LineStatus::Available)
            .cloned()
            .collect())
    }

    async fn list_by_campaign(&self, campaign_id: Uuid) -> Result<Vec<PhoneLine>, AppError> {
        Ok(self
            .state
            .lock()
            .lines
            .iter()
            .filter(|l| l.campaign_id == campaign_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl CallLogRepository for InMemoryStore {
    async fn create(&self, log: &NewCallLog) -> Result<CallLog, AppError> {
        if take_failure(&self.failing_log_writes) {
            return Err(AppError::Database("connection reset".to_string()));
        }

        let mut state = self.state.lock();
        if state
            .call_logs
            .iter()
            .any(|l| l.request_uuid == log.request_uuid)
        {
            return Err(AppError::Conflict(format!(
                "Call log for {} already exists",
                log.request_uuid
            )));
        }

        let created = CallLog {
            call_logs_id: log.call_logs_id,
            call_type: log.call_type,
            customer_id: log.customer_id.clone(),
            request_uuid: log.request_uuid.clone(),
            provider: log.provider,
            to_number: log.to_number.clone(),
            from_number: log.from_number.clone(),
            organisation_id: log.organisation_id,
            agent_id: log.agent_id,
            usecase_id: log.usecase_id,
            hangup_cause: None,
            duration_billed: None,
            conversation_id: None,
            transcript: None,
            summary: None,
            created_at: Utc::now(),
            ended_at: None,
        };
        state.call_logs.push(created.clone());
        Ok(created)
    }

    async fn find_by_id(&self, call_logs_id: Uuid) -> Result<Option<CallLog>, AppError> {
        Ok(self
            .state
            .lock()
            .call_logs
            .iter()
            .find(|l| l.call_logs_id == call_logs_id)
            .cloned())
    }

    async fn find_by_request_uuid(&self, request_uuid: &str) -> Result<Option<CallLog>, AppError> {
        Ok(self
            .state
            .lock()
            .call_logs
            .iter()
            .find(|l| l.request_uuid == request_uuid)
            .cloned())
    }

    async fn reconcile_hangup(
        &self,
        request_uuid: &str,
        hangup_cause: &str,
        duration_billed: i64,
        outcome: AttemptOutcome,
    ) -> Result<Option<CallLog>, AppError> {
        let mut state = self.state.lock();
        let mut draft = state.clone();

        let Some(log) = draft
            .call_logs
            .iter_mut()
            .find(|l| l.request_uuid == request_uuid && l.hangup_cause.is_none())
        else {
            return Ok(None);
        };
        log.hangup_cause = Some(hangup_cause.to_string());
        log.duration_billed = Some(duration_billed);
        log.ended_at = Some(Utc::now());
        let log = log.clone();

        match log.call_type {
            CallType::CampaignOutbound => {
                if let Ok(call_id) = log.customer_id.parse::<i64>() {
                    let (status, retry_after) = match outcome {
                        AttemptOutcome::Completed => (CallStatus::Completed, None),
                        AttemptOutcome::RetryAfter(date) => (CallStatus::NotInitiated, Some(date)),
                    };
                    draft.close_attempt(call_id, status, retry_after);
                }
            }
            CallType::ScheduledOutbound => {
                if let Some(call) = Uuid::parse_str(&log.customer_id)
                    .ok()
                    .and_then(|id| draft.scheduled_calls.get_mut(&id))
                    .filter(|c| c.status == ScheduledCallStatus::InProcess)
                {
                    call.status = ScheduledCallStatus::Completed;
                    call.updated_at = Utc::now();
                }
            }
            CallType::Inbound => {}
        }

        if duration_billed > 0 {
            if take_failure(&self.failing_usage_updates) {
                return Err(AppError::Database("connection reset".to_string()));
            }
            if let Some(usage) = draft.organisations.get_mut(&log.organisation_id) {
                usage.calls_consumed += 1;
                usage.consumed_call_minutes += duration_billed;
            }
        }

        *state = draft;
        Ok(Some(log))
    }

    async fn record_conversation(
        &self,
        call_logs_id: Uuid,
        record: &ConversationRecord,
    ) -> Result<bool, AppError> {
        let mut state = self.state.lock();
        let Some(log) = state
            .call_logs
            .iter_mut()
            .find(|l| l.call_logs_id == call_logs_id)
        else {
            return Ok(false);
        };

        log.conversation_id = Some(record.conversation_id.clone());
        log.transcript = record.transcript.clone();
        log.summary = record.summary.clone();
        Ok(true)
    }
}

#[async_trait]
impl OrganisationRepository for InMemoryStore {
    async fn find_usage(
        &self,
        organisation_id: Uuid,
    ) -> Result<Option<OrganisationUsage>, AppError> {
        if self.usage_unavailable.load(Ordering::SeqCst) {
            return Err(AppError::Database("connection refused".to_string()));
        }
        Ok(self.usage(organisation_id))
    }
}

#[async_trait]
impl SubscriptionRepository for InMemoryStore {
    async fn find_subscription(
        &self,
        organisation_id: Uuid,
    ) -> Result<Option<Subscription>, AppError> {
        Ok(self
            .state
            .lock()
            .subscriptions
            .get(&organisation_id)
            .cloned())
    }
}

#[async_trait]
impl ScheduledCallRepository for InMemoryStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<ScheduledCall>, AppError> {
        Ok(self.scheduled_call(id))
    }

    async fn find_due(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<ScheduledCall>, AppError> {
        let state = self.state.lock();
        let mut due: Vec<ScheduledCall> = state
            .scheduled_calls
            .values()
            .filter(|c| c.is_due(now))
            .cloned()
            .collect();
        due.sort_by_key(|c| c.call_at);
        due.truncate(limit.max(0) as usize);
        Ok(due)
    }

    async fn transition(
        &self,
        id: Uuid,
        from: ScheduledCallStatus,
        to: ScheduledCallStatus,
        failure_reason: Option<&str>,
    ) -> Result<bool, AppError> {
        let mut state = self.state.lock();
        match state.scheduled_calls.get_mut(&id) {
            Some(call) if call.status == from => {
                call.status = to;
                if let Some(reason) = failure_reason {
                    call.failure_reason = Some(reason.to_string());
                }
                call.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl InboundCampaignRepository for InMemoryStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<InboundCampaign>, AppError> {
        Ok(self.inbound_campaign(id))
    }

    async fn find_by_phone_number(
        &self,
        phone_number: &str,
    ) -> Result<Option<InboundCampaign>, AppError> {
        Ok(self
            .state
            .lock()
            .inbound
            .values()
            .find(|c| c.phone_number == phone_number)
            .cloned())
    }

    async fn set_status(&self, id: Uuid, status: InboundStatus) -> Result<bool, AppError> {
        let mut state = self.state.lock();
        match state.inbound.get_mut(&id) {
            Some(campaign) => {
                campaign.status = status;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl AgentRepository for InMemoryStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Agent>, AppError> {
        Ok(self.state.lock().agents.get(&id).cloned())
    }
}
