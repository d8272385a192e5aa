use std::{future::IntoFuture, io, net::SocketAddr, sync::Arc, time::Duration};

use anyhow::anyhow;
use axum::Router;
use configs::{AppConfig, AuthConfig, StorageConfig};
use service::{
    storage::{FileSystemStore, GcsConfig, GcsStore, UserSaveStore},
    token::{GoogleTokenChecker, GoogleTokenConfig, TokenChecker},
};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{routes, state::AppState};

#[derive(Debug, Error)]
pub enum ServeError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("server error: {0}")]
    Serve(#[source] io::Error),
    #[error("in-flight requests still running after {0:?}")]
    DrainTimeout(Duration),
}

/// A bound listener, ready to serve.
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Server {
    pub async fn bind(addr: &str) -> Result<Self, ServeError> {
        let bind_err = |source| ServeError::Bind { addr: addr.to_string(), source };
        let listener = TcpListener::bind(addr).await.map_err(bind_err)?;
        let local_addr = listener.local_addr().map_err(bind_err)?;
        Ok(Self { listener, local_addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve until `shutdown` is cancelled, then give in-flight requests `grace` to finish.
    /// Past `grace` the drain is abandoned; connection tasks live on until the runtime stops.
    pub async fn run(
        self,
        app: Router,
        shutdown: CancellationToken,
        grace: Duration,
    ) -> Result<(), ServeError> {
        let addr = self.local_addr;
        info!(event = "listening", %addr, "usersave server listening");

        let signal = shutdown.clone();
        let serving = axum::serve(self.listener, app)
            .with_graceful_shutdown(async move { signal.cancelled().await })
            .into_future();
        tokio::pin!(serving);

        tokio::select! {
            res = &mut serving => res.map_err(ServeError::Serve)?,
            _ = shutdown.cancelled() => {
                info!(event = "draining", %addr, grace_ms = grace.as_millis() as u64, "shutdown requested, draining");
                match tokio::time::timeout(grace, &mut serving).await {
                    Ok(res) => res.map_err(ServeError::Serve)?,
                    Err(_) => {
                        warn!(event = "drain_timeout", %addr, "drain abandoned with requests still in flight");
                        return Err(ServeError::DrainTimeout(grace));
                    }
                }
            }
        }

        info!(event = "stopped", %addr, "usersave server stopped");
        Ok(())
    }
}

/// Bind `addr` and serve `app` until `shutdown` fires.
pub async fn serve(
    addr: &str,
    app: Router,
    shutdown: CancellationToken,
    grace: Duration,
) -> Result<(), ServeError> {
    Server::bind(addr).await?.run(app, shutdown, grace).await
}

async fn build_store(storage: Option<&StorageConfig>) -> anyhow::Result<Arc<dyn UserSaveStore>> {
    match storage {
        Some(StorageConfig::Filesystem { root }) => {
            let store = FileSystemStore::new(root.as_str()).await?;
            info!(event = "store_ready", backend = "filesystem", root = %root, "storage ready");
            Ok(Arc::new(store))
        }
        Some(StorageConfig::Gcs { bucket, endpoint, access_token, request_timeout_secs }) => {
            let store = GcsStore::connect(GcsConfig {
                bucket: bucket.clone(),
                endpoint: endpoint.clone(),
                access_token: access_token.clone(),
                request_timeout: Duration::from_secs(*request_timeout_secs),
            })
            .await?;
            info!(event = "store_ready", backend = "gcs", bucket = %bucket, "storage ready");
            Ok(Arc::new(store))
        }
        None => Err(anyhow!("no storage configured")),
    }
}

fn build_checker(auth: &AuthConfig) -> anyhow::Result<Arc<dyn TokenChecker>> {
    if auth.client_ids.is_empty() {
        warn!(event = "development_mode", "no client id configured, token audience is not checked");
    }
    let checker = GoogleTokenChecker::new(GoogleTokenConfig {
        client_ids: auth.client_ids.clone(),
        jwks_url: auth.jwks_url.clone(),
        jwks_ttl: auth.jwks_ttl(),
        request_timeout: auth.request_timeout(),
    })?;
    Ok(Arc::new(checker))
}

/// Public entry: wire backends from `cfg` and serve until `shutdown` is cancelled.
pub async fn run(cfg: &AppConfig, shutdown: CancellationToken) -> anyhow::Result<()> {
    let checker = build_checker(&cfg.auth)?;
    let store = build_store(cfg.storage.as_ref()).await?;
    run_with(cfg, store, checker, shutdown).await
}

/// Serve with already built backends. `store` is closed exactly once, whatever happens.
pub async fn run_with(
    cfg: &AppConfig,
    store: Arc<dyn UserSaveStore>,
    checker: Arc<dyn TokenChecker>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let served = serve_app(cfg, Arc::clone(&store), checker, shutdown).await;
    let closed = store.close().await;
    if let Err(e) = &closed {
        warn!(event = "store_close_failed", error = %e, "failed to close storage");
    }
    served?;
    closed?;
    Ok(())
}

async fn serve_app(
    cfg: &AppConfig,
    store: Arc<dyn UserSaveStore>,
    checker: Arc<dyn TokenChecker>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let state = AppState::new(store, checker, &cfg.server.allowed_origin)?;
    let app = routes::build_router(state);
    serve(&cfg.server.addr, app, shutdown, cfg.server.shutdown_grace()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use models::UserId;
    use service::{
        storage::{MemoryStore, SaveReader, SaveSink, StoreError},
        token::mock::StaticTokenChecker,
    };

    use super::*;

    #[tokio::test]
    async fn invalid_address_is_a_bind_error() {
        let res = Server::bind("localhost:-1").await;
        assert!(matches!(res, Err(ServeError::Bind { .. })));
    }

    /// Memory store that counts `close` calls.
    #[derive(Default)]
    struct CloseCounting {
        inner: MemoryStore,
        closes: AtomicUsize,
    }

    #[async_trait]
    impl UserSaveStore for CloseCounting {
        async fn fetch(&self, user_id: &UserId) -> Result<SaveReader, StoreError> {
            self.inner.fetch(user_id).await
        }

        async fn save(&self, user_id: &UserId) -> Result<Box<dyn SaveSink>, StoreError> {
            self.inner.save(user_id).await
        }

        async fn close(&self) -> Result<(), StoreError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn test_config(addr: &str, origin: &str) -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.server.addr = addr.into();
        cfg.server.allowed_origin = origin.into();
        cfg
    }

    async fn closes_after_run(cfg: &AppConfig, shutdown: CancellationToken) -> (anyhow::Result<()>, usize) {
        let store = Arc::new(CloseCounting::default());
        let checker = Arc::new(StaticTokenChecker::new());
        let res = run_with(cfg, store.clone(), checker, shutdown).await;
        (res, store.closes.load(Ordering::SeqCst))
    }

    #[tokio::test]
    async fn store_closed_once_on_every_exit_path() {
        let bad_origin = test_config("127.0.0.1:0", "https://\u{e9}.example");
        let (res, closes) = closes_after_run(&bad_origin, CancellationToken::new()).await;
        assert!(res.is_err());
        assert_eq!(closes, 1);

        let (res, closes) = closes_after_run(&test_config("localhost:-1", "*"), CancellationToken::new()).await;
        assert!(res.is_err());
        assert_eq!(closes, 1);

        let cancelled = CancellationToken::new();
        cancelled.cancel();
        let (res, closes) = closes_after_run(&test_config("127.0.0.1:0", "*"), cancelled).await;
        assert!(res.is_ok());
        assert_eq!(closes, 1);
    }

    #[tokio::test]
    async fn missing_storage_fails_before_binding() {
        let cfg = AppConfig::default();
        assert!(run(&cfg, CancellationToken::new()).await.is_err());
    }
}
