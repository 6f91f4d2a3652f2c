//! Unified error handling for callflow
//!
//! Business declines (campaign outside its window, no free line, quota spent)
//! are modelled as values by the services. This type covers the failures that
//! abort an operation, with automatic HTTP response mapping.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

/// Main application error type
///
/// It implements `ResponseError` so API handlers can return it directly.
#[derive(Error, Debug)]
pub enum AppError {
    // datastore
    #[error("Database error: {0}")]
    Database(String),

    #[error("Database pool error: {0}")]
    Pool(String),

    #[error("Transaction failed: {0}")]
    Transaction(String),

    // telephony
    #[error("Call provider error: {0}")]
    Provider(String),

    #[error("Call provider rejected the request: {0}")]
    ProviderRejected(String),

    #[error("Unsupported call provider: {0}")]
    UnknownProvider(String),

    #[error("Campaign not found: {0}")]
    CampaignNotFound(String),

    #[error("Campaign call not found: {0}")]
    CallNotFound(String),

    #[error("Scheduled call not found: {0}")]
    ScheduledCallNotFound(String),

    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Call log not found: {0}")]
    CallLogNotFound(String),

    #[error("Subscription has no remaining calls or minutes: {0}")]
    QuotaExceeded(String),

    #[error("Campaign declined: {0}")]
    Declined(String),

    // request
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    // process
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AppError {
    /// Failures of the datastore itself, as opposed to missing rows
    pub fn is_datastore(&self) -> bool {
        matches!(
            self,
            AppError::Database(_) | AppError::Pool(_) | AppError::Transaction(_)
        )
    }

    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation(_) | AppError::InvalidInput(_) | AppError::UnknownProvider(_) => {
                StatusCode::BAD_REQUEST
            }

            // 403 Forbidden
            AppError::QuotaExceeded(_) => StatusCode::FORBIDDEN,

            // 404 Not Found
            AppError::CampaignNotFound(_)
            | AppError::CallNotFound(_)
            | AppError::ScheduledCallNotFound(_)
            | AppError::AgentNotFound(_)
            | AppError::CallLogNotFound(_)
            | AppError::NotFound(_) => StatusCode::NOT_FOUND,

            // 409 Conflict
            AppError::Conflict(_) => StatusCode::CONFLICT,

            // 422 Unprocessable Entity
            AppError::Declined(_) => StatusCode::UNPROCESSABLE_ENTITY,

            // 502 Bad Gateway
            AppError::Provider(_) | AppError::ProviderRejected(_) => StatusCode::BAD_GATEWAY,

            // 500 Internal Server Error
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "database_error",
            AppError::Pool(_) => "pool_error",
            AppError::Transaction(_) => "transaction_error",
            AppError::Provider(_) => "provider_error",
            AppError::ProviderRejected(_) => "provider_rejected",
            AppError::UnknownProvider(_) => "unknown_provider",
            AppError::CampaignNotFound(_) => "campaign_not_found",
            AppError::CallNotFound(_) => "call_not_found",
            AppError::ScheduledCallNotFound(_) => "scheduled_call_not_found",
            AppError::AgentNotFound(_) => "agent_not_found",
            AppError::CallLogNotFound(_) => "call_log_not_found",
            AppError::QuotaExceeded(_) => "quota_exceeded",
            AppError::Declined(_) => "declined",
            AppError::Validation(_) => "validation_error",
            AppError::InvalidInput(_) => "invalid_input",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::Internal(_) => "internal_error",
            AppError::Config(_) => "config_error",
            AppError::Serialization(_) => "serialization_error",
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
    status: u16,
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        AppError::status_code(self)
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        HttpResponse::build(status).json(ErrorBody {
            error: self.error_code(),
            message: self.to_string(),
            status: status.as_u16(),
        })
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            AppError::CampaignNotFound("42".to_string()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::QuotaExceeded("org".to_string()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::Provider("timeout".to_string()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            AppError::Database("down".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_datastore_errors() {
        assert!(AppError::Pool("exhausted".to_string()).is_datastore());
        assert!(!AppError::CallLogNotFound("x".to_string()).is_datastore());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            AppError::Conflict("already initiated".to_string()).error_code(),
            "conflict"
        );
        assert_eq!(
            AppError::UnknownProvider("vonage".to_string()).error_code(),
            "unknown_provider"
        );
    }
}
