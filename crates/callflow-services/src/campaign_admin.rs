//! Campaign administration
//!
//! Start, stop and backlog upload. A completed campaign is never brought
//! back to running.

use callflow_core::{
    events::{EventSink, CAMPAIGN_STOPPED},
    models::{Campaign, CampaignStatus, NewCampaignCall, DEFAULT_RETRY},
    traits::{CampaignCallRepository, CampaignRepository},
    AppError, AppResult, Clock,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::scheduler::CampaignScheduler;

/// Contact row of a backlog upload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactInput {
    pub phone_number: String,
    #[serde(default)]
    pub retry: Option<i32>,
    #[serde(default)]
    pub call_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Move a running campaign to stopped and record why
pub(crate) async fn stop_campaign(
    campaigns: &dyn CampaignRepository,
    events: &dyn EventSink,
    campaign: &Campaign,
    reason: &str,
) -> AppResult<bool> {
    let stopped = campaigns
        .transition_status(
            campaign.id,
            &[CampaignStatus::Running],
            CampaignStatus::Stopped,
        )
        .await?;

    if stopped {
        info!("Campaign {} stopped: {}", campaign.id, reason);
        events.capture(
            CAMPAIGN_STOPPED,
            &campaign.organisation_id.to_string(),
            json!({ "campaign_id": campaign.id, "reason": reason }),
        );
    }

    Ok(stopped)
}

pub struct CampaignAdmin {
    campaigns: Arc<dyn CampaignRepository>,
    calls: Arc<dyn CampaignCallRepository>,
    scheduler: Arc<CampaignScheduler>,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
}

impl CampaignAdmin {
    pub fn new(
        campaigns: Arc<dyn CampaignRepository>,
        calls: Arc<dyn CampaignCallRepository>,
        scheduler: Arc<CampaignScheduler>,
        events: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            campaigns,
            calls,
            scheduler,
            events,
            clock,
        }
    }

    async fn load(&self, campaign_id: Uuid) -> AppResult<Campaign> {
        self.campaigns
            .find_by_id(campaign_id)
            .await?
            .ok_or_else(|| AppError::CampaignNotFound(campaign_id.to_string()))
    }

    /// Set the campaign running and launch its scheduling loop
    #[instrument(skip(self))]
    pub async fn start(&self, campaign_id: Uuid) -> AppResult<Campaign> {
        let campaign = self.load(campaign_id).await?;

        match campaign.status {
            CampaignStatus::Completed => {
                return Err(AppError::Conflict(format!(
                    "Campaign {} is already completed",
                    campaign_id
                )));
            }
            CampaignStatus::Running => {}
            CampaignStatus::Draft | CampaignStatus::Stopped => {
                let started = self
                    .campaigns
                    .transition_status(
                        campaign_id,
                        &[CampaignStatus::Draft, CampaignStatus::Stopped],
                        CampaignStatus::Running,
                    )
                    .await?;
                if !started {
                    return Err(AppError::Conflict(format!(
                        "Campaign {} changed status concurrently",
                        campaign_id
                    )));
                }
                info!("Campaign {} started", campaign_id);
            }
        }

        self.scheduler.launch(campaign_id);
        self.load(campaign_id).await
    }

    /// Stop a running campaign; its loop exits at the next iteration
    #[instrument(skip(self))]
    pub async fn stop(&self, campaign_id: Uuid) -> AppResult<Campaign> {
        let campaign = self.load(campaign_id).await?;

        if !stop_campaign(
            self.campaigns.as_ref(),
            self.events.as_ref(),
            &campaign,
            "Stopped by user",
        )
        .await?
        {
            return Err(AppError::Conflict(format!(
                "Campaign {} is not running",
                campaign_id
            )));
        }

        self.load(campaign_id).await
    }

    /// Append contacts to the campaign backlog
    #[instrument(skip(self, contacts), fields(count = contacts.len()))]
    pub async fn add_calls(&self, campaign_id: Uuid, contacts: Vec<ContactInput>) -> AppResult<u64> {
        self.load(campaign_id).await?;

        let now = self.clock.now();
        let today = self.clock.today();

        let calls = contacts
            .into_iter()
            .map(|contact| {
                let phone_number = contact.phone_number.trim().to_string();
                if phone_number.is_empty() {
                    return Err(AppError::Validation(
                        "phone_number must not be empty".to_string(),
                    ));
                }
                let retry = contact.retry.unwrap_or(DEFAULT_RETRY);
                if retry < 0 {
                    return Err(AppError::Validation(format!(
                        "retry must not be negative for {}",
                        phone_number
                    )));
                }

                Ok(NewCampaignCall {
                    phone_number,
                    retry,
                    call_at: contact.call_at.unwrap_or(now),
                    next_possible_call_date: today,
                    data: if contact.data.is_null() {
                        json!({})
                    } else {
                        contact.data
                    },
                })
            })
            .collect::<AppResult<Vec<_>>>()?;

        let inserted = self.calls.insert_batch(campaign_id, &calls).await?;
        info!("Added {} calls to campaign {}", inserted, campaign_id);
        Ok(inserted)
    }

    /// Launch the scheduling loop now; false if it is already running
    pub async fn run(&self, campaign_id: Uuid) -> AppResult<bool> {
        self.load(campaign_id).await?;
        Ok(self.scheduler.launch(campaign_id))
    }
}
