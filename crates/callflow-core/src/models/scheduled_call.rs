//! Fixed-time outbound call

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::phone_line::ProviderKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduledCallStatus {
    Scheduled,
    InProcess,
    Failed,
    Completed,
}

impl fmt::Display for ScheduledCallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduledCallStatus::Scheduled => write!(f, "scheduled"),
            ScheduledCallStatus::InProcess => write!(f, "in_process"),
            ScheduledCallStatus::Failed => write!(f, "failed"),
            ScheduledCallStatus::Completed => write!(f, "completed"),
        }
    }
}

impl ScheduledCallStatus {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().replace(' ', "_").as_str() {
            "scheduled" => Some(ScheduledCallStatus::Scheduled),
            "in_process" => Some(ScheduledCallStatus::InProcess),
            "failed" => Some(ScheduledCallStatus::Failed),
            "completed" => Some(ScheduledCallStatus::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledCall {
    pub id: Uuid,
    pub organisation_id: Uuid,
    pub agent_id: Uuid,
    pub to_number: String,
    pub from_number: String,
    pub provider: ProviderKind,
    pub call_at: DateTime<Utc>,
    pub status: ScheduledCallStatus,

    /// Webhook notified with the call result after hangup
    pub end_call_url: Option<String>,

    pub failure_reason: Option<String>,
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScheduledCall {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == ScheduledCallStatus::Scheduled && self.call_at <= now
    }
}

/// Payload POSTed to `end_call_url`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndCallNotification {
    pub call_id: Uuid,
    pub call_logs_id: Uuid,
    pub to_number: String,
    pub from_number: String,
    pub agent_id: Uuid,
    pub hangup_cause: String,
    pub duration: i64,
    pub conversation_id: Option<String>,
}
