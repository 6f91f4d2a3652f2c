//! Webhook form helpers

use callflow_core::telephony::WebhookForm;
use callflow_core::{AppError, AppResult};

pub(crate) fn required<'a>(form: &'a WebhookForm, key: &str) -> AppResult<&'a str> {
    form.get(key)
        .map(String::as_str)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::InvalidInput(format!("Missing webhook field {}", key)))
}

pub(crate) fn optional<'a>(form: &'a WebhookForm, key: &str) -> Option<&'a str> {
    form.get(key).map(String::as_str).filter(|v| !v.is_empty())
}

/// Integer field, 0 when absent or malformed
pub(crate) fn number(form: &WebhookForm, key: &str) -> i64 {
    optional(form, key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(0)
}

/// Provider error message out of a JSON error body, falling back to the raw text
pub(crate) fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("message")
                .or_else(|| v.get("error"))
                .and_then(|m| m.as_str().map(str::to_string))
        })
        .unwrap_or_else(|| body.to_string())
}
