//! Post quota accounting
//!
//! This module provides:
//! - Subscription plans and their per-cycle post allowances
//! - 30-day cycle arithmetic with direct roll-forward
//! - The quota ledger service: approval, publish confirmation, integrity checks

pub mod cycle;
pub mod service;
pub mod types;

pub use cycle::{current_cycle, cycle_end, CycleWindow, CYCLE_DAYS};
pub use service::QuotaService;
pub use types::{
    NewPost, Post, PostStatus, PublishConfirmation, QuotaStatus, QuotaValidation,
    SubscriptionPlan, UserQuota,
};
