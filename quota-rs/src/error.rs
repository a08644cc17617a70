use thiserror::Error;

use crate::quota::types::PostStatus;

#[derive(Error, Debug)]
pub enum QuotaError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Quota exceeded for user {user_id}: all {total_posts} posts of this cycle are used")]
    QuotaExceeded { user_id: String, total_posts: i64 },

    #[error("Quota integrity check failed for user {user_id}: {}", .issues.join("; "))]
    Integrity { user_id: String, issues: Vec<String> },

    #[error("Post {post_id} cannot move from {from} to {to}")]
    InvalidTransition {
        post_id: String,
        from: PostStatus,
        to: PostStatus,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl QuotaError {
    /// Machine-readable code carried in API error bodies
    pub fn code(&self) -> &'static str {
        match self {
            QuotaError::NotFound(_) => "NOT_FOUND",
            QuotaError::QuotaExceeded { .. } => "QUOTA_EXCEEDED",
            QuotaError::Integrity { .. } => "INTEGRITY_ERROR",
            QuotaError::InvalidTransition { .. } => "INVALID_TRANSITION",
            QuotaError::Validation(_) => "VALIDATION_ERROR",
            QuotaError::Unauthorized(_) => "UNAUTHORIZED",
            QuotaError::Forbidden(_) => "FORBIDDEN",
            QuotaError::Database(_) | QuotaError::Config(_) | QuotaError::Parse(_) => {
                "INTERNAL_ERROR"
            }
        }
    }
}

impl From<config::ConfigError> for QuotaError {
    fn from(e: config::ConfigError) -> Self {
        QuotaError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, QuotaError>;
