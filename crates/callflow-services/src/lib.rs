//! Business logic services for callflow
//!
//! This crate contains the campaign call-scheduling and dispatch engine and
//! the services around it.
//!
//! # Architecture
//!
//! - Services hold their repositories as `Arc<dyn Trait>` so the same code
//!   runs against PostgreSQL and the in-memory test store
//! - The datastore is the only authority on call and line state; services
//!   never cache it across iterations
//! - Business declines are returned as values, `AppError` is reserved for
//!   failures
//!
//! # Services
//!
//! - `QuotaGate` - subscription budget check
//! - `CallSelector` - next eligible contact of a campaign
//! - `AvailabilityResolver` - calling window, backlog and free line
//! - `Dispatcher` - claims a call and a line and places the call
//! - `CampaignScheduler` - per-campaign loop, registry and fleet poller
//! - `OutcomeReconciler` - hangup webhooks
//! - `ScheduledCallService`, `InboundRouter`, `CampaignAdmin`,
//!   `ConversationService` - surrounding call flows
//! - `Engine` - wires all of the above over one set of repositories

pub mod availability;
pub mod campaign_admin;
pub mod conversation;
pub mod dispatcher;
pub mod engine;
pub mod inbound;
pub mod quota;
pub mod reconciler;
pub mod scheduled_calls;
pub mod scheduler;
pub mod selector;

pub use availability::{AvailabilityResolver, NextCall, Unavailable};
pub use campaign_admin::{CampaignAdmin, ContactInput};
pub use conversation::ConversationService;
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use engine::{Engine, EngineContext};
pub use inbound::InboundRouter;
pub use quota::{QuotaDecision, QuotaDenial, QuotaGate};
pub use reconciler::{OutcomeReconciler, ReconcileOutcome};
pub use scheduled_calls::ScheduledCallService;
pub use scheduler::{
    schedule_channel, CampaignRegistry, CampaignScheduler, LoopExit, PollSummary, RegistryGuard,
    ScheduleSignals,
};
pub use selector::CallSelector;

use callflow_core::traits::{
    AgentRepository, CallLogRepository, CampaignCallRepository, CampaignRepository,
    InboundCampaignRepository, OrganisationRepository, PhoneLineRepository,
    ScheduledCallRepository, SubscriptionRepository,
};
use std::sync::Arc;

/// Every repository the services depend on
#[derive(Clone)]
pub struct Repositories {
    pub campaigns: Arc<dyn CampaignRepository>,
    pub calls: Arc<dyn CampaignCallRepository>,
    pub lines: Arc<dyn PhoneLineRepository>,
    pub call_logs: Arc<dyn CallLogRepository>,
    pub organisations: Arc<dyn OrganisationRepository>,
    pub subscriptions: Arc<dyn SubscriptionRepository>,
    pub scheduled_calls: Arc<dyn ScheduledCallRepository>,
    pub inbound: Arc<dyn InboundCampaignRepository>,
    pub agents: Arc<dyn AgentRepository>,
}

/// Business logic constants
pub mod constants {
    /// Reason stored on scheduled calls refused by the quota gate
    pub const SUBSCRIPTION_LIMIT_REACHED: &str = "Subscription limit reached";

    /// Conflict message for a scheduled call triggered twice
    pub const CALL_ALREADY_INITIATED: &str = "This call is already initiated";

    /// Wait for a provider to accept a campaign call unless configured
    pub const DEFAULT_PLACEMENT_TIMEOUT_SECS: u64 = 30;

    /// Writes of the call log for an accepted call before giving up
    pub const CALL_LOG_WRITE_ATTEMPTS: u32 = 3;

    /// Call type strings embedded in webhook URLs
    pub const CAMPAIGN_OUTBOUND: &str = "campaign_outbound";
    pub const SCHEDULED_OUTBOUND: &str = "scheduled_outbound";
    pub const INBOUND: &str = "inbound";
}
