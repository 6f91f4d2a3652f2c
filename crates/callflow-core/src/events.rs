//! Observability events
//!
//! Business events (quota checks, campaign stops) are captured through
//! [`EventSink`]. The default sink writes them as structured tracing events.

use serde_json::Value;
use tracing::info;

pub const QUOTA_CHECK_SUCCESS: &str = "subscription_check_success";
pub const QUOTA_CHECK_FAILED: &str = "subscription_check_failed";
pub const CAMPAIGN_STOPPED: &str = "campaign_stopped";
pub const CAMPAIGN_COMPLETED: &str = "campaign_completed";

pub trait EventSink: Send + Sync {
    fn capture(&self, event: &str, distinct_id: &str, properties: Value);
}

/// Emits every event under the `callflow::events` target
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn capture(&self, event: &str, distinct_id: &str, properties: Value) {
        info!(
            target: "callflow::events",
            event = event,
            distinct_id = distinct_id,
            properties = %properties,
            "event captured"
        );
    }
}
