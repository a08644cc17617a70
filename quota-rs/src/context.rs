//! Per-request caller identity
//!
//! Built by the HTTP auth layer from a validated bearer token and handed to
//! handlers explicitly. Nothing in the crate reads caller identity from
//! process-wide state.

use crate::error::{QuotaError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub user_id: String,
    pub session_id: String,
}

impl RequestContext {
    pub fn new(user_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: session_id.into(),
        }
    }

    /// Reject access to another user's resources
    pub fn ensure_user(&self, user_id: &str) -> Result<()> {
        if self.user_id == user_id {
            Ok(())
        } else {
            Err(QuotaError::Forbidden(format!(
                "Session for {} cannot access user {}",
                self.user_id, user_id
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_user() {
        let ctx = RequestContext::new("u1", "s1");
        assert!(ctx.ensure_user("u1").is_ok());
        assert!(matches!(
            ctx.ensure_user("u2"),
            Err(QuotaError::Forbidden(_))
        ));
    }
}
