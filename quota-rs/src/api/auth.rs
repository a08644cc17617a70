//! JWT Authentication for REST API

use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::context::RequestContext;

/// JWT Claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id)
    pub sub: String,
    /// Session id
    pub sid: String,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
    /// Issued at (Unix timestamp)
    pub iat: u64,
}

impl From<Claims> for RequestContext {
    fn from(claims: Claims) -> Self {
        RequestContext::new(claims.sub, claims.sid)
    }
}

/// JWT configuration
pub struct JwtConfig {
    /// Secret key for signing tokens
    secret: String,
    /// Token expiration duration
    expiration: Duration,
}

impl JwtConfig {
    /// Create a new JWT configuration
    pub fn new(secret: String, expiration_hours: u64) -> Self {
        Self {
            secret,
            expiration: Duration::from_secs(expiration_hours * 3600),
        }
    }

    /// Create a token for a new session of `user_id`
    pub fn create_token(&self, user_id: &str) -> Result<String, jsonwebtoken::errors::Error> {
        self.create_session_token(user_id, &Uuid::new_v4().to_string())
    }

    pub fn create_session_token(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now().timestamp().max(0) as u64;

        let claims = Claims {
            sub: user_id.to_string(),
            sid: session_id.to_string(),
            exp: now + self.expiration.as_secs(),
            iat: now,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
    }

    /// Validate a JWT token and extract claims
    pub fn validate_token(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )?;

        Ok(token_data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_validate_token() {
        let config = JwtConfig::new("test-secret".to_string(), 1);

        let token = config.create_session_token("user-42", "session-1").unwrap();
        assert!(!token.is_empty());

        let claims = config.validate_token(&token).unwrap();
        assert_eq!(claims.sub, "user-42");
        assert_eq!(claims.sid, "session-1");
        assert_eq!(claims.exp - claims.iat, 3600);

        let ctx = RequestContext::from(claims);
        assert_eq!(ctx, RequestContext::new("user-42", "session-1"));
    }

    #[test]
    fn test_new_sessions_differ() {
        let config = JwtConfig::new("test-secret".to_string(), 1);

        let a = config.validate_token(&config.create_token("u1").unwrap()).unwrap();
        let b = config.validate_token(&config.create_token("u1").unwrap()).unwrap();
        assert_ne!(a.sid, b.sid);
    }

    #[test]
    fn test_invalid_token() {
        let config = JwtConfig::new("test-secret".to_string(), 1);

        assert!(config.validate_token("invalid-token").is_err());

        let other = JwtConfig::new("other-secret".to_string(), 1);
        let token = other.create_token("u1").unwrap();
        assert!(config.validate_token(&token).is_err());
    }
}
