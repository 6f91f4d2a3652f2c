//! callflow Core Library
//!
//! This crate provides the foundational types, traits, and error handling
//! for the callflow voice-call orchestration backend. It includes:
//!
//! - Domain models (Campaign, CampaignCall, PhoneLine, CallLog, etc.)
//! - Repository, telephony provider, clock and event-sink traits
//! - Unified error handling with HTTP response mapping
//! - Application configuration

pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod telephony;
pub mod traits;

pub use clock::{Clock, SystemClock};
pub use config::AppConfig;
pub use error::AppError;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;
