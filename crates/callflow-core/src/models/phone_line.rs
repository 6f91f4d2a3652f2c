//! Outbound line pool

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineStatus {
    Available,
    Unavailable,
}

impl fmt::Display for LineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineStatus::Available => write!(f, "available"),
            LineStatus::Unavailable => write!(f, "unavailable"),
        }
    }
}

impl LineStatus {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "available" => Some(LineStatus::Available),
            "unavailable" => Some(LineStatus::Unavailable),
            _ => None,
        }
    }
}

/// Telephony provider a number is provisioned with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Twilio,
    Plivo,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Twilio => write!(f, "twilio"),
            ProviderKind::Plivo => write!(f, "plivo"),
        }
    }
}

impl ProviderKind {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "twilio" => Some(ProviderKind::Twilio),
            "plivo" => Some(ProviderKind::Plivo),
            _ => None,
        }
    }
}

/// A campaign phone number together with the provider that owns it.
///
/// At most one in-process campaign call holds a line while it is unavailable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneLine {
    pub campaign_id: Uuid,
    pub phone_number: String,
    pub status: LineStatus,
    pub provider: ProviderKind,
}
