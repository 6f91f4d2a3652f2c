//! Repository traits
//!
//! Abstractions over the datastore. The datastore is the single source of
//! truth for call and line state across process instances, so every state
//! change that must be exclusive is expressed as one conditional operation
//! returning whether it applied.

use crate::error::AppError;
use crate::models::{
    Agent, AttemptOutcome, CallLog, Campaign, CampaignCall, CampaignStatus, ConversationRecord,
    InboundCampaign, InboundStatus, NewCallLog, NewCampaignCall, OrganisationUsage, PhoneLine,
    ScheduledCall, ScheduledCallStatus, Subscription,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use uuid::Uuid;

#[async_trait]
pub trait CampaignRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Campaign>, AppError>;

    /// Running campaigns whose calling window contains `now`
    async fn find_runnable(&self, now: NaiveTime) -> Result<Vec<Campaign>, AppError>;

    /// Move a campaign to `to` only if its current status is one of `from`
    async fn transition_status(
        &self,
        id: Uuid,
        from: &[CampaignStatus],
        to: CampaignStatus,
    ) -> Result<bool, AppError>;
}

#[async_trait]
pub trait CampaignCallRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<CampaignCall>, AppError>;

    /// Highest remaining retry first, then earliest `call_at`
    async fn next_eligible(
        &self,
        campaign_id: Uuid,
        today: NaiveDate,
    ) -> Result<Option<CampaignCall>, AppError>;

    /// Calls still in process or not initiated with retry budget left
    async fn count_pending(&self, campaign_id: Uuid) -> Result<i64, AppError>;

    async fn insert_batch(
        &self,
        campaign_id: Uuid,
        calls: &[NewCampaignCall],
    ) -> Result<u64, AppError>;

    /// Claim a call and a line together.
    ///
    /// Sets the call NotInitiated → InProcess with `from_number` and the
    /// line available → unavailable atomically. Returns false, changing
    /// nothing, if either was already taken.
    async fn begin_attempt(
        &self,
        call_id: i64,
        campaign_id: Uuid,
        from_number: &str,
    ) -> Result<bool, AppError>;

    /// Undo a claim after the provider refused the call: back to
    /// NotInitiated, one attempt consumed, retry from `retry_after`, line
    /// released.
    async fn abort_attempt(&self, call_id: i64, retry_after: NaiveDate) -> Result<bool, AppError>;
}

#[async_trait]
pub trait PhoneLineRepository: Send + Sync {
    async fn list_available(&self, campaign_id: Uuid) -> Result<Vec<PhoneLine>, AppError>;

    async fn list_by_campaign(&self, campaign_id: Uuid) -> Result<Vec<PhoneLine>, AppError>;
}

#[async_trait]
pub trait CallLogRepository: Send + Sync {
    async fn create(&self, log: &NewCallLog) -> Result<CallLog, AppError>;

    async fn find_by_id(&self, call_logs_id: Uuid) -> Result<Option<CallLog>, AppError>;

    async fn find_by_request_uuid(&self, request_uuid: &str) -> Result<Option<CallLog>, AppError>;

    /// Apply a hangup as one unit of work. Returns the updated log, or
    /// `None`, changing nothing, if the log was already reconciled.
    ///
    /// Together with the log update, the record owning the call is closed:
    /// an in-process campaign call gets `outcome` and releases its line, an
    /// in-process scheduled call becomes Completed. A billed duration adds
    /// one call and the duration to the organisation's usage. Either all of
    /// it is stored or none of it, so a failed attempt can be redelivered.
    async fn reconcile_hangup(
        &self,
        request_uuid: &str,
        hangup_cause: &str,
        duration_billed: i64,
        outcome: AttemptOutcome,
    ) -> Result<Option<CallLog>, AppError>;

    async fn record_conversation(
        &self,
        call_logs_id: Uuid,
        record: &ConversationRecord,
    ) -> Result<bool, AppError>;
}

#[async_trait]
pub trait OrganisationRepository: Send + Sync {
    async fn find_usage(&self, organisation_id: Uuid)
        -> Result<Option<OrganisationUsage>, AppError>;
}

#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    async fn find_subscription(&self, organisation_id: Uuid)
        -> Result<Option<Subscription>, AppError>;
}

#[async_trait]
pub trait ScheduledCallRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<ScheduledCall>, AppError>;

    /// Scheduled calls whose `call_at` has passed, oldest first
    async fn find_due(&self, now: DateTime<Utc>, limit: i64)
        -> Result<Vec<ScheduledCall>, AppError>;

    async fn transition(
        &self,
        id: Uuid,
        from: ScheduledCallStatus,
        to: ScheduledCallStatus,
        failure_reason: Option<&str>,
    ) -> Result<bool, AppError>;
}

#[async_trait]
pub trait InboundCampaignRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<InboundCampaign>, AppError>;

    /// Resolve the inbound campaign a dialled number belongs to
    async fn find_by_phone_number(
        &self,
        phone_number: &str,
    ) -> Result<Option<InboundCampaign>, AppError>;

    async fn set_status(&self, id: Uuid, status: InboundStatus) -> Result<bool, AppError>;
}

#[async_trait]
pub trait AgentRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Agent>, AppError>;
}
