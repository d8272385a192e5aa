//! Google Cloud Storage backend over the JSON API.
//!
//! One `reqwest::Client` is built in [`GcsStore::connect`] and shared by
//! every request task; it is released by [`UserSaveStore::close`].

use std::{
    io::{self, Cursor},
    pin::Pin,
    sync::atomic::{AtomicBool, Ordering},
    task::{Context, Poll},
    time::Duration,
};

use async_trait::async_trait;
use models::UserId;
use reqwest::{header, Client, StatusCode, Url};
use tokio::io::AsyncWrite;
use tracing::{debug, info, warn};

use super::{SaveReader, SaveSink, StoreError, UserSaveStore, USER_SAVE_CONTENT_TYPE};

pub const DEFAULT_ENDPOINT: &str = "https://storage.googleapis.com";

/// Connection settings for [`GcsStore`].
#[derive(Debug, Clone)]
pub struct GcsConfig {
    pub bucket: String,
    /// Base URL of the API; point it at an emulator for local runs.
    pub endpoint: String,
    /// OAuth2 access token sent as `Authorization: Bearer`. Anonymous when `None`.
    pub access_token: Option<String>,
    pub request_timeout: Duration,
}

impl GcsConfig {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            access_token: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Keeps each user save as the object `<user id>` in one bucket.
#[derive(Debug)]
pub struct GcsStore {
    client: Client,
    endpoint: Url,
    bucket: String,
    access_token: Option<String>,
    closed: AtomicBool,
}

impl GcsStore {
    /// Builds the shared client and checks that the bucket is reachable.
    pub async fn connect(cfg: GcsConfig) -> Result<Self, StoreError> {
        if cfg.bucket.trim().is_empty() {
            return Err(StoreError::Config("bucket name is empty".into()));
        }
        let endpoint = Url::parse(&cfg.endpoint)
            .map_err(|e| StoreError::Config(format!("invalid endpoint {}: {e}", cfg.endpoint)))?;
        if endpoint.cannot_be_a_base() {
            return Err(StoreError::Config(format!("endpoint {} cannot be a base URL", cfg.endpoint)));
        }
        info!(bucket = %cfg.bucket, endpoint = %endpoint, "creating google storage client");
        let client = Client::builder().timeout(cfg.request_timeout).build()?;

        let store = Self {
            client,
            endpoint,
            bucket: cfg.bucket,
            access_token: cfg.access_token,
            closed: AtomicBool::new(false),
        };

        let bucket_url = store.url(&["storage", "v1", "b", &store.bucket]);
        let resp = store.authorize(store.client.get(bucket_url)).send().await?;
        if !resp.status().is_success() {
            return Err(StoreError::Backend(format!(
                "bucket {} not accessible: {}",
                store.bucket,
                resp.status()
            )));
        }
        info!(bucket = %store.bucket, "created google storage client");
        Ok(store)
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.access_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Backend("storage client already closed".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl UserSaveStore for GcsStore {
    async fn fetch(&self, user_id: &UserId) -> Result<SaveReader, StoreError> {
        self.ensure_open()?;
        debug!(%user_id, bucket = %self.bucket, "fetching google usersave");
        let mut url = self.url(&["storage", "v1", "b", &self.bucket, "o", user_id.as_str()]);
        url.query_pairs_mut().append_pair("alt", "media");

        let resp = self.authorize(self.client.get(url)).send().await?;
        match resp.status() {
            StatusCode::NOT_FOUND => return Err(StoreError::NotFound),
            status if !status.is_success() => {
                warn!(%user_id, %status, "fetching google usersave failed");
                return Err(StoreError::Backend(format!("fetch returned {status}")));
            }
            _ => {}
        }
        let body = resp.bytes().await?;
        debug!(%user_id, bytes = body.len(), "fetched google usersave");
        Ok(Box::new(Cursor::new(body)))
    }

    async fn save(&self, user_id: &UserId) -> Result<Box<dyn SaveSink>, StoreError> {
        self.ensure_open()?;
        let mut url = self.url(&["upload", "storage", "v1", "b", &self.bucket, "o"]);
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", user_id.as_str());
        let request = self
            .authorize(self.client.post(url))
            .header(header::CONTENT_TYPE, USER_SAVE_CONTENT_TYPE);
        Ok(Box::new(GcsSink { buf: Vec::new(), request: Some(request), user_id: user_id.clone() }))
    }

    async fn close(&self) -> Result<(), StoreError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(StoreError::Backend("storage client closed twice".into()));
        }
        info!(bucket = %self.bucket, "closed google storage client");
        Ok(())
    }
}

/// Buffers the document and uploads it in one media upload on commit.
/// Object uploads replace the previous generation atomically.
struct GcsSink {
    buf: Vec<u8>,
    request: Option<reqwest::RequestBuilder>,
    user_id: UserId,
}

impl AsyncWrite for GcsSink {
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
impl SaveSink for GcsSink {
    async fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        let request = self
            .request
            .take()
            .ok_or_else(|| StoreError::Backend("sink already committed".into()))?;
        let body = std::mem::take(&mut self.buf);
        let resp = request.body(body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            warn!(user_id = %self.user_id, %status, "saving google usersave failed");
            return Err(StoreError::Backend(format!("upload returned {status}")));
        }
        debug!(user_id = %self.user_id, "saved google usersave");
        Ok(())
    }
}
