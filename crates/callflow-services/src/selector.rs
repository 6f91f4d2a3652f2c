//! Call selector
//!
//! Picks the next contact of a campaign: not initiated, retry budget left,
//! retry date reached. Contacts with more retry budget go first, then the
//! earliest scheduled. Selection is a read; exclusivity comes from the claim
//! the dispatcher makes afterwards.

use callflow_core::{models::CampaignCall, traits::CampaignCallRepository, AppResult, Clock};
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

pub struct CallSelector {
    calls: Arc<dyn CampaignCallRepository>,
    clock: Arc<dyn Clock>,
}

impl CallSelector {
    pub fn new(calls: Arc<dyn CampaignCallRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { calls, clock }
    }

    #[instrument(skip(self))]
    pub async fn select_next(&self, campaign_id: Uuid) -> AppResult<Option<CampaignCall>> {
        let call = self
            .calls
            .next_eligible(campaign_id, self.clock.today())
            .await?;

        if let Some(call) = &call {
            debug!(
                "Selected call {} (retry {}) for campaign {}",
                call.id, call.retry, campaign_id
            );
        }

        Ok(call)
    }

    /// Whether any call is still in process or has retry budget left
    pub async fn has_pending(&self, campaign_id: Uuid) -> AppResult<bool> {
        Ok(self.calls.count_pending(campaign_id).await? > 0)
    }
}
