//! callflow Database Layer
//!
//! This crate provides PostgreSQL database access and repository implementations
//! for callflow. It includes:
//!
//! - Connection pool management with sqlx
//! - Embedded schema migrations
//! - Repository implementations for all domain entities
//! - Single-transaction claim/release of campaign calls and phone lines

pub mod pool;
pub mod repositories;

pub use pool::{create_pool, run_migrations};
pub use repositories::*;

// Re-export commonly used types
pub use callflow_core::{AppError, AppResult};
pub use sqlx::{PgPool, Postgres, Transaction};
