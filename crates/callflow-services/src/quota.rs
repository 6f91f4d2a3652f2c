//! Quota gate
//!
//! Decides whether an organisation may place another call under its
//! subscription. A missing organisation or subscription is a normal business
//! outcome and yields a denial; only datastore failures are errors.
//!
//! Every check emits an observability event carrying its result.

use callflow_core::{
    events::{EventSink, QUOTA_CHECK_FAILED, QUOTA_CHECK_SUCCESS},
    models::SubscriptionStatus,
    traits::{OrganisationRepository, SubscriptionRepository},
    AppResult, Clock,
};
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Why an organisation is over quota
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuotaDenial {
    OrganisationNotFound,
    NoSubscription,
    Inactive(SubscriptionStatus),
    Expired,
    Exhausted {
        remaining_calls: i64,
        remaining_minutes: i64,
    },
}

impl fmt::Display for QuotaDenial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuotaDenial::OrganisationNotFound => write!(f, "Organisation not found"),
            QuotaDenial::NoSubscription => {
                write!(f, "Subscription not found for the organisation")
            }
            QuotaDenial::Inactive(_) => write!(f, "Subscription not active"),
            QuotaDenial::Expired => write!(f, "Subscription expired"),
            QuotaDenial::Exhausted { .. } => write!(f, "No remaining calls or minutes"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuotaDecision {
    Allowed {
        remaining_calls: i64,
        remaining_minutes: i64,
    },
    Denied(QuotaDenial),
}

impl QuotaDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, QuotaDecision::Allowed { .. })
    }
}

pub struct QuotaGate {
    organisations: Arc<dyn OrganisationRepository>,
    subscriptions: Arc<dyn SubscriptionRepository>,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
}

impl QuotaGate {
    pub fn new(
        organisations: Arc<dyn OrganisationRepository>,
        subscriptions: Arc<dyn SubscriptionRepository>,
        events: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            organisations,
            subscriptions,
            events,
            clock,
        }
    }

    /// Check the organisation's remaining budget
    #[instrument(skip(self))]
    pub async fn check(&self, organisation_id: Uuid) -> AppResult<QuotaDecision> {
        let decision = self.evaluate(organisation_id).await?;
        let distinct_id = organisation_id.to_string();

        match &decision {
            QuotaDecision::Allowed {
                remaining_calls,
                remaining_minutes,
            } => {
                debug!(
                    "Organisation {} within quota: {} calls, {} minutes left",
                    organisation_id, remaining_calls, remaining_minutes
                );
                self.events.capture(
                    QUOTA_CHECK_SUCCESS,
                    &distinct_id,
                    json!({
                        "organisation_id": distinct_id,
                        "remaining_calls": remaining_calls,
                        "remaining_minutes": remaining_minutes,
                    }),
                );
            }
            QuotaDecision::Denied(denial) => {
                info!("Organisation {} over quota: {}", organisation_id, denial);
                let mut properties = json!({
                    "error": denial.to_string(),
                    "organisation_id": distinct_id,
                });
                match denial {
                    QuotaDenial::Inactive(status) => {
                        properties["subscription_status"] = json!(status.to_string());
                    }
                    QuotaDenial::Exhausted {
                        remaining_calls,
                        remaining_minutes,
                    } => {
                        properties["remaining_calls"] = json!(remaining_calls);
                        properties["remaining_minutes"] = json!(remaining_minutes);
                    }
                    _ => {}
                }
                self.events
                    .capture(QUOTA_CHECK_FAILED, &distinct_id, properties);
            }
        }

        Ok(decision)
    }

    /// Boolean form of [`QuotaGate::check`]
    pub async fn is_within_quota(&self, organisation_id: Uuid) -> AppResult<bool> {
        Ok(self.check(organisation_id).await?.is_allowed())
    }

    async fn evaluate(&self, organisation_id: Uuid) -> AppResult<QuotaDecision> {
        let Some(usage) = self.organisations.find_usage(organisation_id).await? else {
            return Ok(QuotaDecision::Denied(QuotaDenial::OrganisationNotFound));
        };

        let Some(subscription) = self.subscriptions.find_subscription(organisation_id).await?
        else {
            return Ok(QuotaDecision::Denied(QuotaDenial::NoSubscription));
        };

        if subscription.status != SubscriptionStatus::Active {
            return Ok(QuotaDecision::Denied(QuotaDenial::Inactive(
                subscription.status,
            )));
        }

        if subscription.end_date < self.clock.now() {
            return Ok(QuotaDecision::Denied(QuotaDenial::Expired));
        }

        let remaining_calls = subscription.remaining_calls(&usage);
        let remaining_minutes = subscription.remaining_minutes(&usage);
        if remaining_calls <= 0 || remaining_minutes <= 0 {
            return Ok(QuotaDecision::Denied(QuotaDenial::Exhausted {
                remaining_calls,
                remaining_minutes,
            }));
        }

        Ok(QuotaDecision::Allowed {
            remaining_calls,
            remaining_minutes,
        })
    }
}
