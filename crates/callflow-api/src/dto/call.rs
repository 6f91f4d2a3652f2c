//! Call placement and provider webhook DTOs

use callflow_services::{DispatchOutcome, ReconcileOutcome};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::common::deserialize_number_from_string;

/// Place one campaign call now
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct TriggerCallRequest {
    #[serde(deserialize_with = "deserialize_number_from_string")]
    #[validate(range(min = 1, message = "call_id must be positive"))]
    pub call_id: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TriggerCallResponse {
    Placed {
        call_id: i64,
        call_logs_id: Uuid,
        request_uuid: String,
    },
    PlacementFailed {
        call_id: i64,
        reason: String,
    },
    Skipped {
        call_id: i64,
    },
}

impl From<DispatchOutcome> for TriggerCallResponse {
    fn from(outcome: DispatchOutcome) -> Self {
        match outcome {
            DispatchOutcome::Placed {
                call_id,
                call_logs_id,
                request_uuid,
            } => Self::Placed {
                call_id,
                call_logs_id,
                request_uuid,
            },
            DispatchOutcome::PlacementFailed { call_id, reason } => {
                Self::PlacementFailed { call_id, reason }
            }
            DispatchOutcome::Skipped { call_id } => Self::Skipped { call_id },
        }
    }
}

/// Query string embedded in the answer and hangup webhook URLs
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct WebhookQuery {
    #[validate(length(min = 1, message = "provider is required"))]
    pub provider: String,

    #[serde(rename = "type")]
    #[validate(length(min = 1, message = "type is required"))]
    pub call_type: String,

    pub call_logs_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HangupResponse {
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_logs_id: Option<Uuid>,
}

impl From<ReconcileOutcome> for HangupResponse {
    fn from(outcome: ReconcileOutcome) -> Self {
        match outcome {
            ReconcileOutcome::Unknown => Self {
                outcome: "unknown",
                call_logs_id: None,
            },
            ReconcileOutcome::Duplicate => Self {
                outcome: "duplicate",
                call_logs_id: None,
            },
            ReconcileOutcome::Reconciled { call_logs_id, .. } => Self {
                outcome: "reconciled",
                call_logs_id: Some(call_logs_id),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_call_accepts_string_ids() {
        let req: TriggerCallRequest = serde_json::from_str(r#"{"call_id": "42"}"#).unwrap();
        assert_eq!(req.call_id, 42);
        assert!(req.validate().is_ok());

        let req: TriggerCallRequest = serde_json::from_str(r#"{"call_id": 0}"#).unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_trigger_response_is_tagged() {
        let body = serde_json::to_value(TriggerCallResponse::from(DispatchOutcome::Skipped {
            call_id: 7,
        }))
        .unwrap();
        assert_eq!(body["status"], "skipped");
        assert_eq!(body["call_id"], 7);
    }
}
