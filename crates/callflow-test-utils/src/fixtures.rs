//! Model constructors with sensible defaults

use callflow_core::models::{
    Agent, CallStatus, Campaign, CampaignCall, CampaignStatus, InboundCampaign, InboundStatus,
    LineStatus, OrganisationUsage, PhoneLine, ProviderKind, ScheduledCall, ScheduledCallStatus,
    Subscription, SubscriptionStatus,
};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde_json::json;
use uuid::Uuid;

pub fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

pub fn usage(organisation_id: Uuid) -> OrganisationUsage {
    OrganisationUsage {
        organisation_id,
        calls_consumed: 0,
        consumed_call_minutes: 0,
    }
}

/// Active subscription ending 30 days after `now`, 100 calls and 1000 minutes
pub fn active_subscription(organisation_id: Uuid, now: DateTime<Utc>) -> Subscription {
    Subscription {
        organisation_id,
        status: SubscriptionStatus::Active,
        end_date: now + Duration::days(30),
        total_calls_allowed: 100,
        total_call_minutes: 1000,
    }
}

/// Running campaign open all day
pub fn running_campaign(organisation_id: Uuid, agent_id: Uuid) -> Campaign {
    let now = Utc::now();
    Campaign {
        id: Uuid::new_v4(),
        organisation_id,
        name: "Renewals".to_string(),
        status: CampaignStatus::Running,
        availability_start_time: hm(0, 0),
        availability_end_time: hm(23, 59),
        agent_id,
        created_at: now,
        updated_at: now,
    }
}

pub fn contact(campaign_id: Uuid, phone_number: &str, retry: i32, today: NaiveDate) -> CampaignCall {
    let now = Utc::now();
    CampaignCall {
        id: 0,
        campaign_id,
        phone_number: phone_number.to_string(),
        status: CallStatus::NotInitiated,
        retry,
        total_calls: 0,
        next_possible_call_date: today,
        from_number: None,
        call_at: now,
        data: json!({ "name": format!("Contact {}", phone_number) }),
        created_at: now,
        updated_at: now,
    }
}

pub fn line(campaign_id: Uuid, phone_number: &str, provider: ProviderKind) -> PhoneLine {
    PhoneLine {
        campaign_id,
        phone_number: phone_number.to_string(),
        status: LineStatus::Available,
        provider,
    }
}

pub fn agent(organisation_id: Uuid) -> Agent {
    Agent {
        id: Uuid::new_v4(),
        organisation_id,
        name: "Ava".to_string(),
        external_agent_id: "agent_ext_1".to_string(),
        metadata: json!({ "voice": "alloy" }),
    }
}

pub fn scheduled_call(
    organisation_id: Uuid,
    agent_id: Uuid,
    call_at: DateTime<Utc>,
    provider: ProviderKind,
) -> ScheduledCall {
    ScheduledCall {
        id: Uuid::new_v4(),
        organisation_id,
        agent_id,
        to_number: "+15550001111".to_string(),
        from_number: "+15559990000".to_string(),
        provider,
        call_at,
        status: ScheduledCallStatus::Scheduled,
        end_call_url: None,
        failure_reason: None,
        data: json!({ "appointment": "Tuesday 10:00" }),
        created_at: call_at,
        updated_at: call_at,
    }
}

pub fn inbound_campaign(
    organisation_id: Uuid,
    agent_id: Uuid,
    phone_number: &str,
    provider: ProviderKind,
) -> InboundCampaign {
    InboundCampaign {
        id: Uuid::new_v4(),
        organisation_id,
        agent_id,
        status: InboundStatus::Running,
        phone_number: phone_number.to_string(),
        provider,
        created_at: Utc::now(),
    }
}
