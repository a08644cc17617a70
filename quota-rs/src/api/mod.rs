//! REST API module for quota-rs
//!
//! Provides the HTTP surface over the quota service

pub mod auth;
pub mod handlers;
pub mod server;

pub use auth::{Claims, JwtConfig};
pub use handlers::{ApiError, AppState};
pub use server::{build_router, ApiServer};
