//! Organisation usage and subscription

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Consumption counters of a tenant. Both only ever grow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganisationUsage {
    pub organisation_id: Uuid,
    pub calls_consumed: i64,
    pub consumed_call_minutes: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    PastDue,
    Canceled,
    Inactive,
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionStatus::Active => write!(f, "active"),
            SubscriptionStatus::PastDue => write!(f, "past_due"),
            SubscriptionStatus::Canceled => write!(f, "canceled"),
            SubscriptionStatus::Inactive => write!(f, "inactive"),
        }
    }
}

impl SubscriptionStatus {
    /// Unknown values are treated as inactive
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "active" => SubscriptionStatus::Active,
            "past_due" => SubscriptionStatus::PastDue,
            "canceled" | "cancelled" => SubscriptionStatus::Canceled,
            _ => SubscriptionStatus::Inactive,
        }
    }
}

/// Subscription plan limits of an organisation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub organisation_id: Uuid,
    pub status: SubscriptionStatus,
    pub end_date: DateTime<Utc>,
    pub total_calls_allowed: i64,
    pub total_call_minutes: i64,
}

impl Subscription {
    pub fn remaining_calls(&self, usage: &OrganisationUsage) -> i64 {
        self.total_calls_allowed - usage.calls_consumed
    }

    pub fn remaining_minutes(&self, usage: &OrganisationUsage) -> i64 {
        self.total_call_minutes - usage.consumed_call_minutes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remaining_budget() {
        let org = Uuid::new_v4();
        let sub = Subscription {
            organisation_id: org,
            status: SubscriptionStatus::Active,
            end_date: Utc::now(),
            total_calls_allowed: 100,
            total_call_minutes: 600,
        };
        let usage = OrganisationUsage {
            organisation_id: org,
            calls_consumed: 40,
            consumed_call_minutes: 600,
        };

        assert_eq!(sub.remaining_calls(&usage), 60);
        assert_eq!(sub.remaining_minutes(&usage), 0);
    }

    #[test]
    fn test_status_parse_is_lenient() {
        assert_eq!(SubscriptionStatus::from_str("ACTIVE"), SubscriptionStatus::Active);
        assert_eq!(SubscriptionStatus::from_str("cancelled"), SubscriptionStatus::Canceled);
        assert_eq!(SubscriptionStatus::from_str("trialing"), SubscriptionStatus::Inactive);
    }
}
