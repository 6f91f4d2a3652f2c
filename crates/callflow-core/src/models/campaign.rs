//! Campaign model
//!
//! A campaign is a tenant-defined bulk outbound calling job. It owns its
//! contact backlog (`CampaignCall`) and its outbound line pool (`PhoneLine`).

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Campaign lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    /// Created but never started
    #[default]
    Draft,
    /// Scheduling loop may dispatch calls
    Running,
    /// Stopped explicitly or on quota exhaustion
    Stopped,
    /// Backlog exhausted, never resurrected automatically
    Completed,
}

impl fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CampaignStatus::Draft => write!(f, "draft"),
            CampaignStatus::Running => write!(f, "running"),
            CampaignStatus::Stopped => write!(f, "stopped"),
            CampaignStatus::Completed => write!(f, "completed"),
        }
    }
}

impl CampaignStatus {
    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "draft" => Some(CampaignStatus::Draft),
            "running" => Some(CampaignStatus::Running),
            "stopped" => Some(CampaignStatus::Stopped),
            "completed" => Some(CampaignStatus::Completed),
            _ => None,
        }
    }
}

/// Campaign entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: Uuid,
    pub organisation_id: Uuid,
    pub name: String,
    pub status: CampaignStatus,

    /// Start of the daily calling window (UTC wall clock)
    pub availability_start_time: NaiveTime,

    /// End of the daily calling window; may be earlier than the start for
    /// windows that wrap past midnight
    pub availability_end_time: NaiveTime,

    pub agent_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    #[inline]
    pub fn is_running(&self) -> bool {
        self.status == CampaignStatus::Running
    }

    /// Whether `now` falls inside the campaign's calling window
    pub fn is_callable_at(&self, now: NaiveTime) -> bool {
        window_contains(self.availability_start_time, self.availability_end_time, now)
    }
}

/// Daily window check, inclusive at both ends.
///
/// When `start > end` the window wraps midnight and is satisfied by
/// `now >= start || now <= end`.
pub fn window_contains(start: NaiveTime, end: NaiveTime, now: NaiveTime) -> bool {
    if start <= end {
        start <= now && now <= end
    } else {
        now >= start || now <= end
    }
}
