//! Token checking: bearer token in, stable user id out.

use async_trait::async_trait;
use thiserror::Error;

pub mod google;
pub mod multi;

pub use google::{GoogleTokenChecker, GoogleTokenConfig};
pub use multi::MultiTokenChecker;

/// Why a token was not accepted.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("malformed token: {0}")]
    Malformed(String),
    #[error("no signing key with id {0:?}")]
    UnknownKey(String),
    #[error("token rejected: {0}")]
    Rejected(String),
    #[error("failed to fetch signing keys: {0}")]
    KeyFetch(String),
}

/// Validates an opaque token and returns the identifier of its subject.
///
/// An `Ok` with an empty id is a checker bug; callers must still treat
/// the request as unauthenticated.
#[async_trait]
pub trait TokenChecker: Send + Sync {
    async fn validate(&self, token: &str) -> Result<String, TokenError>;
}

/// Simple in-memory checker for tests and doc examples
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Accepts exactly the tokens it was given, mapping each to a fixed id.
    #[derive(Default)]
    pub struct StaticTokenChecker {
        tokens: HashMap<String, String>,
        calls: AtomicUsize,
    }

    impl StaticTokenChecker {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_token(mut self, token: impl Into<String>, user_id: impl Into<String>) -> Self {
            self.tokens.insert(token.into(), user_id.into());
            self
        }

        /// Number of `validate` calls seen so far.
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TokenChecker for StaticTokenChecker {
        async fn validate(&self, token: &str) -> Result<String, TokenError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.tokens
                .get(token)
                .cloned()
                .ok_or_else(|| TokenError::Rejected("unknown token".into()))
        }
    }
}
