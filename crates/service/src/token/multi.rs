use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{TokenChecker, TokenError};

/// Tries each checker in order; the first one to accept the token wins.
/// When all reject, the last rejection is returned.
pub struct MultiTokenChecker {
    checkers: Vec<Arc<dyn TokenChecker>>,
}

impl MultiTokenChecker {
    pub fn new(checkers: Vec<Arc<dyn TokenChecker>>) -> Self {
        Self { checkers }
    }
}

#[async_trait]
impl TokenChecker for MultiTokenChecker {
    async fn validate(&self, token: &str) -> Result<String, TokenError> {
        let mut last = TokenError::Rejected("no token checkers configured".into());
        for (idx, checker) in self.checkers.iter().enumerate() {
            match checker.validate(token).await {
                Ok(id) => return Ok(id),
                Err(e) => {
                    debug!(checker = idx, error = %e, "token checker rejected token");
                    last = e;
                }
            }
        }
        Err(last)
    }
}
