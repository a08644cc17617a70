//! quota-rs: post-quota ledger for TheAgencyIQ
//!
//! Tracks how many AI-generated posts each subscriber may still publish in
//! the current 30-day cycle, across Facebook, Instagram, LinkedIn, X and
//! YouTube.
//!
//! # Features
//!
//! - **Plans**: starter (12), growth (27) and professional (52) posts per cycle
//! - **Two-step publishing**: approval is free, only a confirmed publish deducts
//! - **Exactly-once deduction**: repeated or concurrent confirmations never
//!   double-charge or overdraw the quota
//! - **Rolling cycles**: expired cycles jump straight to the window containing now
//! - **Integrity checks**: the cached count is verified against the post table
//!
//! # Example
//!
//! ```no_run
//! use quota_rs::quota::{QuotaService, SubscriptionPlan};
//! use sqlx::SqlitePool;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = SqlitePool::connect("sqlite://quota.db").await?;
//!     let service = QuotaService::new(pool);
//!     service.init_db().await?;
//!
//!     let status = service
//!         .initialize_quota("user-42", SubscriptionPlan::Professional)
//!         .await?;
//!     println!("{} posts left", status.remaining_posts);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - [`api`]: HTTP API
//! - [`config`]: Configuration management
//! - [`context`]: Per-request caller identity
//! - [`db`]: Connection pool and schema
//! - [`error`]: Error types and handling
//! - [`logging`]: Tracing subscriber setup
//! - [`platform`]: Social platforms and credentials
//! - [`quota`]: Quota ledger and cycle accounting
//! - [`utils`]: Timestamps and input validation

pub mod api;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod logging;
pub mod platform;
pub mod quota;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use context::RequestContext;
pub use error::{QuotaError, Result};
