//! Campaign call model
//!
//! One contact within a campaign backlog, together with its attempt state.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Default attempt budget for newly uploaded contacts
pub const DEFAULT_RETRY: i32 = 3;

/// Attempt status of a campaign call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    #[default]
    NotInitiated,
    InProcess,
    Completed,
    Failed,
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallStatus::NotInitiated => write!(f, "not_initiated"),
            CallStatus::InProcess => write!(f, "in_process"),
            CallStatus::Completed => write!(f, "completed"),
            CallStatus::Failed => write!(f, "failed"),
        }
    }
}

impl CallStatus {
    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().replace(' ', "_").as_str() {
            "not_initiated" => Some(CallStatus::NotInitiated),
            "in_process" => Some(CallStatus::InProcess),
            "completed" => Some(CallStatus::Completed),
            "failed" => Some(CallStatus::Failed),
            _ => None,
        }
    }
}

/// Campaign call entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignCall {
    pub id: i64,
    pub campaign_id: Uuid,
    pub phone_number: String,
    pub status: CallStatus,

    /// Remaining attempt budget; never negative
    pub retry: i32,

    /// Attempts that reached a terminal outcome
    pub total_calls: i32,

    /// Earliest UTC date the call may be attempted again
    pub next_possible_call_date: NaiveDate,

    /// Outbound line currently or last assigned
    pub from_number: Option<String>,

    /// Originally scheduled time, used as the secondary selection order
    pub call_at: DateTime<Utc>,

    /// Per-contact payload (name, dynamic variables for the voice agent)
    pub data: serde_json::Value,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CampaignCall {
    /// Selection predicate applied by the call selector
    pub fn is_eligible(&self, today: NaiveDate) -> bool {
        self.status == CallStatus::NotInitiated
            && self.retry > 0
            && self.next_possible_call_date <= today
    }

    /// Still counts toward the campaign's outstanding work
    pub fn is_pending(&self) -> bool {
        match self.status {
            CallStatus::InProcess => true,
            CallStatus::NotInitiated => self.retry > 0,
            _ => false,
        }
    }
}

/// Contact uploaded into a campaign backlog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCampaignCall {
    pub phone_number: String,
    pub retry: i32,
    pub call_at: DateTime<Utc>,
    pub next_possible_call_date: NaiveDate,
    pub data: serde_json::Value,
}

/// Terminal result applied when an in-process attempt ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Normal hangup: the contact is done
    Completed,
    /// Any other termination: back to the backlog from the given date
    RetryAfter(NaiveDate),
}
