use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::QuotaError;

/// Supported publishing platforms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Facebook,
    Instagram,
    LinkedIn,
    #[serde(alias = "twitter")]
    X,
    YouTube,
}

impl Platform {
    pub const ALL: [Platform; 5] = [
        Platform::Facebook,
        Platform::Instagram,
        Platform::LinkedIn,
        Platform::X,
        Platform::YouTube,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Facebook => "facebook",
            Platform::Instagram => "instagram",
            Platform::LinkedIn => "linkedin",
            Platform::X => "x",
            Platform::YouTube => "youtube",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = QuotaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "facebook" => Ok(Platform::Facebook),
            "instagram" => Ok(Platform::Instagram),
            "linkedin" => Ok(Platform::LinkedIn),
            "x" | "twitter" => Ok(Platform::X),
            "youtube" => Ok(Platform::YouTube),
            other => Err(QuotaError::Validation(format!(
                "Unknown platform: {}",
                other
            ))),
        }
    }
}

/// OAuth credential for one platform connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformCredential {
    pub platform: Platform,
    pub token: String,
    pub refresh_token: Option<String>,
    /// None when the provider issues non-expiring tokens
    pub expires_at: Option<DateTime<Utc>>,
}

impl PlatformCredential {
    pub fn new(platform: Platform, token: impl Into<String>) -> Self {
        Self {
            platform,
            token: token.into(),
            refresh_token: None,
            expires_at: None,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(expires_at) if now >= expires_at)
    }

    /// True when the token expires within `skew` and a refresh token is available
    pub fn needs_refresh(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        self.refresh_token.is_some()
            && matches!(self.expires_at, Some(expires_at) if now + skew >= expires_at)
    }
}
