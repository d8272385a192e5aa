use std::{
    collections::HashMap,
    io::{self, Cursor},
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use async_trait::async_trait;
use models::UserId;
use tokio::{io::AsyncWrite, sync::RwLock};

use super::{SaveReader, SaveSink, StoreError, UserSaveStore};

/// In-process store for tests and local experiments. Contents die with the process.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<HashMap<UserId, Arc<Vec<u8>>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw bytes currently stored for `user_id`.
    pub async fn get(&self, user_id: &UserId) -> Option<Vec<u8>> {
        let map = self.inner.read().await;
        map.get(user_id).map(|v| v.as_ref().clone())
    }

    pub async fn insert(&self, user_id: UserId, bytes: Vec<u8>) {
        let mut map = self.inner.write().await;
        map.insert(user_id, Arc::new(bytes));
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl UserSaveStore for MemoryStore {
    async fn fetch(&self, user_id: &UserId) -> Result<SaveReader, StoreError> {
        let map = self.inner.read().await;
        let bytes = map.get(user_id).cloned().ok_or(StoreError::NotFound)?;
        Ok(Box::new(Cursor::new(ArcBytes(bytes))))
    }

    async fn save(&self, user_id: &UserId) -> Result<Box<dyn SaveSink>, StoreError> {
        Ok(Box::new(MemorySink {
            buf: Vec::new(),
            user_id: user_id.clone(),
            inner: Arc::clone(&self.inner),
        }))
    }
}

struct ArcBytes(Arc<Vec<u8>>);

impl AsRef<[u8]> for ArcBytes {
    fn as_ref(&self) -> &[u8] {
        self.0.as_slice()
    }
}

struct MemorySink {
    buf: Vec<u8>,
    user_id: UserId,
    inner: Arc<RwLock<HashMap<UserId, Arc<Vec<u8>>>>>,
}

impl AsyncWrite for MemorySink {
    fn poll_write(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.buf).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.buf).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.buf).poll_shutdown(cx)
    }
}

#[async_trait]
impl SaveSink for MemorySink {
    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemorySink { buf, user_id, inner } = *self;
        inner.write().await.insert(user_id, Arc::new(buf));
        Ok(())
    }
}
