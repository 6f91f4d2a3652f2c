//! Campaign DTOs

use callflow_core::models::{Campaign, CampaignStatus};
use callflow_services::ContactInput;
use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// One contact of a backlog upload
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ContactRequest {
    #[validate(length(min = 3, max = 20, message = "phone_number must be 3-20 characters"))]
    pub phone_number: String,

    /// Total attempts allowed, 3 when omitted
    #[validate(range(min = 0, max = 10))]
    pub retry: Option<i32>,

    /// Earliest time to call, now when omitted
    pub call_at: Option<DateTime<Utc>>,

    /// Per-contact variables handed to the voice agent
    #[serde(default)]
    pub data: serde_json::Value,
}

impl From<ContactRequest> for ContactInput {
    fn from(req: ContactRequest) -> Self {
        Self {
            phone_number: req.phone_number,
            retry: req.retry,
            call_at: req.call_at,
            data: req.data,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AddCallsRequest {
    #[validate(length(min = 1, max = 10000, message = "1-10000 contacts per upload"))]
    #[validate(nested)]
    pub contacts: Vec<ContactRequest>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AddCallsResponse {
    pub campaign_id: Uuid,
    pub inserted: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CampaignResponse {
    pub id: Uuid,
    pub organisation_id: Uuid,
    pub name: String,
    pub status: CampaignStatus,
    pub availability_start_time: NaiveTime,
    pub availability_end_time: NaiveTime,
    pub agent_id: Uuid,
    pub updated_at: DateTime<Utc>,
}

impl From<Campaign> for CampaignResponse {
    fn from(c: Campaign) -> Self {
        Self {
            id: c.id,
            organisation_id: c.organisation_id,
            name: c.name,
            status: c.status,
            availability_start_time: c.availability_start_time,
            availability_end_time: c.availability_end_time,
            agent_id: c.agent_id,
            updated_at: c.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunCampaignResponse {
    pub campaign_id: Uuid,
    /// False when a loop for the campaign was already running
    pub launched: bool,
}
