//! Storage abstractions for user saves
//!
//! A store hands out a reader for an existing document and a sink for a
//! new one. Nothing becomes visible until the sink is committed; dropping
//! an uncommitted sink discards what was written.

use async_trait::async_trait;
use models::UserId;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

pub mod filesystem;
pub mod gcs;
pub mod memory;

pub use filesystem::FileSystemStore;
pub use gcs::{GcsConfig, GcsStore};
pub use memory::MemoryStore;

/// Media type of every stored document.
pub const USER_SAVE_CONTENT_TYPE: &str = "application/json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no such user save")]
    NotFound,
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error("invalid storage configuration: {0}")]
    Config(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound)
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// Byte stream of a stored document. Dropping it releases the underlying handle.
pub type SaveReader = Box<dyn AsyncRead + Send + Unpin>;

/// Writable destination for a new document.
#[async_trait]
pub trait SaveSink: AsyncWrite + Send + Unpin {
    /// Makes everything written so far the user's current save.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// Persistence for user saves keyed by [`UserId`].
#[async_trait]
pub trait UserSaveStore: Send + Sync {
    /// Opens the user's save, failing with [`StoreError::NotFound`] if there is none.
    async fn fetch(&self, user_id: &UserId) -> Result<SaveReader, StoreError>;

    /// Starts overwriting the user's save.
    async fn save(&self, user_id: &UserId) -> Result<Box<dyn SaveSink>, StoreError>;

    /// Releases long-lived backend handles. Called once at shutdown.
    async fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
