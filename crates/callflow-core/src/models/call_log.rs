//! Call log model
//!
//! Append-only record of one telephony attempt. Created when the provider
//! accepts a call, completed at hangup and at conversation end.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::phone_line::ProviderKind;

/// Which flow produced the call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallType {
    CampaignOutbound,
    ScheduledOutbound,
    Inbound,
}

impl fmt::Display for CallType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallType::CampaignOutbound => write!(f, "campaign_outbound"),
            CallType::ScheduledOutbound => write!(f, "scheduled_outbound"),
            CallType::Inbound => write!(f, "inbound"),
        }
    }
}

impl CallType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "campaign_outbound" | "outbound" => Some(CallType::CampaignOutbound),
            "scheduled_outbound" | "scheduled" => Some(CallType::ScheduledOutbound),
            "inbound" => Some(CallType::Inbound),
            _ => None,
        }
    }
}

/// Call log entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallLog {
    pub call_logs_id: Uuid,
    pub call_type: CallType,

    /// Id of the owning record: campaign call id, scheduled call id or
    /// inbound campaign id depending on `call_type`
    pub customer_id: String,

    /// Provider's identifier for the call
    pub request_uuid: String,

    pub provider: ProviderKind,
    pub to_number: String,
    pub from_number: String,
    pub organisation_id: Uuid,
    pub agent_id: Uuid,

    /// Campaign the call belongs to, if any
    pub usecase_id: Option<Uuid>,

    pub hangup_cause: Option<String>,
    pub duration_billed: Option<i64>,

    pub conversation_id: Option<String>,
    pub transcript: Option<serde_json::Value>,
    pub summary: Option<String>,

    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl CallLog {
    pub fn is_reconciled(&self) -> bool {
        self.hangup_cause.is_some()
    }
}

/// Insert payload for a call log
///
/// The id is generated before the call is placed so the provider webhooks
/// can carry it.
#[derive(Debug, Clone)]
pub struct NewCallLog {
    pub call_logs_id: Uuid,
    pub call_type: CallType,
    pub customer_id: String,
    pub request_uuid: String,
    pub provider: ProviderKind,
    pub to_number: String,
    pub from_number: String,
    pub organisation_id: Uuid,
    pub agent_id: Uuid,
    pub usecase_id: Option<Uuid>,
}

/// Data written back when the voice conversation ends
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub conversation_id: String,
    pub transcript: Option<serde_json::Value>,
    pub summary: Option<String>,
}
