//! Repository implementations
//!
//! This module contains concrete implementations of all repository traits
//! defined in callflow-core, using sqlx for PostgreSQL access.

mod attempt;

pub mod agent_repo;
pub mod call_log_repo;
pub mod campaign_call_repo;
pub mod campaign_repo;
pub mod inbound_repo;
pub mod organisation_repo;
pub mod phone_line_repo;
pub mod scheduled_call_repo;

pub use agent_repo::PgAgentRepository;
pub use call_log_repo::PgCallLogRepository;
pub use campaign_call_repo::PgCampaignCallRepository;
pub use campaign_repo::PgCampaignRepository;
pub use inbound_repo::PgInboundCampaignRepository;
pub use organisation_repo::PgOrganisationRepository;
pub use phone_line_repo::PgPhoneLineRepository;
pub use scheduled_call_repo::PgScheduledCallRepository;
