//! Inbound campaigns route calls dialled to their numbers to one agent

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::phone_line::ProviderKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InboundStatus {
    Running,
    Stopped,
}

impl fmt::Display for InboundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InboundStatus::Running => write!(f, "running"),
            InboundStatus::Stopped => write!(f, "stopped"),
        }
    }
}

impl InboundStatus {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "running" => Some(InboundStatus::Running),
            "stopped" => Some(InboundStatus::Stopped),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundCampaign {
    pub id: Uuid,
    pub organisation_id: Uuid,
    pub agent_id: Uuid,
    pub status: InboundStatus,

    /// The dialled number the campaign was resolved through
    pub phone_number: String,
    pub provider: ProviderKind,
    pub created_at: DateTime<Utc>,
}
