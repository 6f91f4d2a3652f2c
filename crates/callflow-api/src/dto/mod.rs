//! Data Transfer Objects (DTOs) for API requests and responses

pub mod call;
pub mod campaign;
pub mod common;
pub mod conversation;

pub use call::*;
pub use campaign::*;
pub use common::ApiResponse;
pub use conversation::*;
