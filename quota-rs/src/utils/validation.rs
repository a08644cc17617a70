use crate::error::{QuotaError, Result};

/// Longest post body accepted (LinkedIn's limit, the largest of the five platforms)
pub const MAX_CONTENT_LENGTH: usize = 3000;

const MAX_USER_ID_LENGTH: usize = 128;

/// Basic user identifier validation
pub fn validate_user_id(user_id: &str) -> Result<()> {
    if user_id.trim().is_empty() {
        return Err(QuotaError::Validation("User id is empty".to_string()));
    }

    if user_id.len() > MAX_USER_ID_LENGTH {
        return Err(QuotaError::Validation(format!(
            "User id longer than {} characters",
            MAX_USER_ID_LENGTH
        )));
    }

    if user_id.chars().any(|c| c.is_control() || c.is_whitespace()) {
        return Err(QuotaError::Validation(
            "User id contains whitespace or control characters".to_string(),
        ));
    }

    Ok(())
}

/// Post body validation
pub fn validate_content(content: &str) -> Result<()> {
    if content.trim().is_empty() {
        return Err(QuotaError::Validation("Post content is empty".to_string()));
    }

    if content.chars().count() > MAX_CONTENT_LENGTH {
        return Err(QuotaError::Validation(format!(
            "Post content longer than {} characters",
            MAX_CONTENT_LENGTH
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_user_id() {
        assert!(validate_user_id("42").is_ok());
        assert!(validate_user_id("user-7f3a").is_ok());
    }

    #[test]
    fn test_invalid_user_id() {
        assert!(validate_user_id("").is_err());
        assert!(validate_user_id("   ").is_err());
        assert!(validate_user_id("has space").is_err());
        assert!(validate_user_id(&"x".repeat(129)).is_err());
    }

    #[test]
    fn test_content_limits() {
        assert!(validate_content("Queensland small business tip of the day").is_ok());
        assert!(validate_content("").is_err());
        assert!(validate_content(&"a".repeat(MAX_CONTENT_LENGTH)).is_ok());
        assert!(validate_content(&"a".repeat(MAX_CONTENT_LENGTH + 1)).is_err());
    }
}
