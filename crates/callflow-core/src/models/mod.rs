//! Domain models for callflow
//!
//! This module contains all the core domain models used throughout the application.

pub mod agent;
pub mod call_log;
pub mod campaign;
pub mod campaign_call;
pub mod inbound;
pub mod organisation;
pub mod phone_line;
pub mod scheduled_call;

pub use agent::{Agent, ConversationContext};
pub use call_log::{CallLog, CallType, ConversationRecord, NewCallLog};
pub use campaign::{window_contains, Campaign, CampaignStatus};
pub use campaign_call::{AttemptOutcome, CallStatus, CampaignCall, NewCampaignCall, DEFAULT_RETRY};
pub use inbound::{InboundCampaign, InboundStatus};
pub use organisation::{OrganisationUsage, Subscription, SubscriptionStatus};
pub use phone_line::{LineStatus, PhoneLine, ProviderKind};
pub use scheduled_call::{EndCallNotification, ScheduledCall, ScheduledCallStatus};
