//! API layer for callflow
//!
//! Thin HTTP boundary over the call services: campaign administration,
//! on-demand call placement, provider webhooks and the voice engine's
//! conversation endpoints.

#![forbid(unsafe_code)]

pub mod dto;
pub mod handlers;
pub mod state;

pub use dto::ApiResponse;
pub use handlers::configure_routes;
pub use state::AppState;
