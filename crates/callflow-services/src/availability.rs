//! Availability resolver
//!
//! Decides whether a campaign may place a call right now and with which
//! contact and line. The checks run in a fixed order and the first failing
//! one short-circuits with its reason:
//!
//! 1. campaign exists and is running
//! 2. UTC time of day is inside the calling window
//! 3. an eligible contact exists; a campaign with nothing pending is
//!    completed here
//! 4. a line is free, polling a bounded number of times

use callflow_core::{
    events::{EventSink, CAMPAIGN_COMPLETED},
    models::{Campaign, CampaignCall, CampaignStatus, PhoneLine},
    traits::{CampaignRepository, PhoneLineRepository},
    AppResult, Clock,
};
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::selector::CallSelector;

/// Reason a campaign cannot place a call now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unavailable {
    CampaignNotFound,
    NotRunning,
    OutsideWindow,
    /// Nothing eligible now, but calls remain pending
    NoCallToSchedule,
    /// Backlog exhausted; the campaign has been completed
    Exhausted,
    NoLineAvailable,
}

impl Unavailable {
    /// The campaign will not run again without an external change
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Unavailable::CampaignNotFound | Unavailable::NotRunning | Unavailable::Exhausted
        )
    }
}

impl fmt::Display for Unavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Unavailable::CampaignNotFound => "Campaign Not Found",
            Unavailable::NotRunning => "Campaign is not running",
            Unavailable::OutsideWindow => "Campaign is not available to call",
            Unavailable::NoCallToSchedule => "No call to schedule",
            Unavailable::Exhausted => "All calls are completed or out of retry",
            Unavailable::NoLineAvailable => "No Phone number available to call",
        };
        f.write_str(reason)
    }
}

/// A contact ready to dispatch on a free line
#[derive(Debug, Clone)]
pub struct NextCall {
    pub campaign: Campaign,
    pub call: CampaignCall,
    pub line: PhoneLine,
}

pub struct AvailabilityResolver {
    campaigns: Arc<dyn CampaignRepository>,
    lines: Arc<dyn PhoneLineRepository>,
    selector: Arc<CallSelector>,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    line_poll_attempts: u32,
    line_poll_interval: Duration,
}

impl AvailabilityResolver {
    pub fn new(
        campaigns: Arc<dyn CampaignRepository>,
        lines: Arc<dyn PhoneLineRepository>,
        selector: Arc<CallSelector>,
        events: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            campaigns,
            lines,
            selector,
            events,
            clock,
            line_poll_attempts: 6,
            line_poll_interval: Duration::from_secs(30),
        }
    }

    /// Override the free-line polling budget
    pub fn with_line_polling(mut self, attempts: u32, interval: Duration) -> Self {
        self.line_poll_attempts = attempts.max(1);
        self.line_poll_interval = interval;
        self
    }

    #[instrument(skip(self))]
    pub async fn next_available_line(
        &self,
        campaign_id: Uuid,
    ) -> AppResult<Result<NextCall, Unavailable>> {
        let Some(campaign) = self.campaigns.find_by_id(campaign_id).await? else {
            return Ok(Err(Unavailable::CampaignNotFound));
        };

        if !campaign.is_running() {
            return Ok(Err(Unavailable::NotRunning));
        }

        let now = self.clock.time_of_day();
        if !campaign.is_callable_at(now) {
            debug!(
                "Campaign {} outside window {}-{} at {}",
                campaign_id, campaign.availability_start_time, campaign.availability_end_time, now
            );
            return Ok(Err(Unavailable::OutsideWindow));
        }

        let Some(call) = self.selector.select_next(campaign_id).await? else {
            return self.resolve_empty_backlog(&campaign).await.map(Err);
        };

        match self.poll_for_line(campaign_id).await? {
            Some(line) => Ok(Ok(NextCall {
                campaign,
                call,
                line,
            })),
            None => Ok(Err(Unavailable::NoLineAvailable)),
        }
    }

    async fn resolve_empty_backlog(&self, campaign: &Campaign) -> AppResult<Unavailable> {
        if self.selector.has_pending(campaign.id).await? {
            return Ok(Unavailable::NoCallToSchedule);
        }

        let completed = self
            .campaigns
            .transition_status(
                campaign.id,
                &[CampaignStatus::Running],
                CampaignStatus::Completed,
            )
            .await?;

        if completed {
            info!("Campaign {} completed", campaign.id);
            self.events.capture(
                CAMPAIGN_COMPLETED,
                &campaign.organisation_id.to_string(),
                json!({ "campaign_id": campaign.id }),
            );
        }

        Ok(Unavailable::Exhausted)
    }

    async fn poll_for_line(&self, campaign_id: Uuid) -> AppResult<Option<PhoneLine>> {
        for attempt in 1..=self.line_poll_attempts {
            let mut available = self.lines.list_available(campaign_id).await?;
            if !available.is_empty() {
                return Ok(Some(available.swap_remove(0)));
            }

            debug!(
                "No free line for campaign {} (attempt {}/{})",
                campaign_id, attempt, self.line_poll_attempts
            );

            if attempt < self.line_poll_attempts {
                tokio::time::sleep(self.line_poll_interval).await;
            }
        }

        Ok(None)
    }
}
