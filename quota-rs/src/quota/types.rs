//! Subscription, post and quota ledger types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::QuotaError;
use crate::platform::Platform;

/// Subscription plan of a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionPlan {
    Starter,
    Growth,
    Professional,
}

impl SubscriptionPlan {
    /// Posts allowed per 30-day cycle
    pub fn total_posts(&self) -> i64 {
        match self {
            SubscriptionPlan::Starter => 12,
            SubscriptionPlan::Growth => 27,
            SubscriptionPlan::Professional => 52,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionPlan::Starter => "starter",
            SubscriptionPlan::Growth => "growth",
            SubscriptionPlan::Professional => "professional",
        }
    }
}

impl fmt::Display for SubscriptionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionPlan {
    type Err = QuotaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "starter" => Ok(SubscriptionPlan::Starter),
            "growth" => Ok(SubscriptionPlan::Growth),
            "professional" => Ok(SubscriptionPlan::Professional),
            other => Err(QuotaError::Validation(format!(
                "Unknown subscription plan: {}",
                other
            ))),
        }
    }
}

/// Lifecycle state of a post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Draft,
    Approved,
    Published,
    Failed,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Approved => "approved",
            PostStatus::Published => "published",
            PostStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostStatus {
    type Err = QuotaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(PostStatus::Draft),
            "approved" => Ok(PostStatus::Approved),
            "published" => Ok(PostStatus::Published),
            "failed" => Ok(PostStatus::Failed),
            other => Err(QuotaError::Parse(format!("Unknown post status: {}", other))),
        }
    }
}

/// Per-user quota ledger row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserQuota {
    pub user_id: String,
    pub plan: SubscriptionPlan,
    /// Start of the current 30-day cycle
    pub cycle_start: DateTime<Utc>,
    pub total_posts_allowed: i64,
    /// Cached count of posts published in the current cycle
    pub published_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserQuota {
    pub fn remaining_posts(&self) -> i64 {
        (self.total_posts_allowed - self.published_count).max(0)
    }
}

/// Scheduled social media post
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub user_id: String,
    pub platform: Platform,
    pub content: String,
    pub status: PostStatus,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to create a draft post
#[derive(Debug, Clone, Deserialize)]
pub struct NewPost {
    pub platform: Platform,
    pub content: String,
    pub scheduled_for: Option<DateTime<Utc>>,
}

/// Quota snapshot returned to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaStatus {
    pub user_id: String,
    pub plan: SubscriptionPlan,
    pub total_posts: i64,
    pub published_posts: i64,
    pub remaining_posts: i64,
    pub cycle_start: DateTime<Utc>,
    pub cycle_end: DateTime<Utc>,
}

/// Result of an integrity check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaValidation {
    pub valid: bool,
    pub issues: Vec<String>,
}

/// Outcome of a publish confirmation
#[derive(Debug, Clone, Serialize)]
pub struct PublishConfirmation {
    pub post: Post,
    /// False when the post was already published and nothing was deducted
    pub deducted: bool,
    pub quota: QuotaStatus,
}
