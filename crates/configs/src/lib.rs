use std::time::Duration;

use anyhow::anyhow;
use anyhow::Result;
use serde::Deserialize;

pub const DEFAULT_ADDR: &str = "0.0.0.0:5000";
pub const DEFAULT_JWKS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";
pub const DEFAULT_GCS_ENDPOINT: &str = "https://storage.googleapis.com";

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub storage: Option<StorageConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_addr")]
    pub addr: String,
    #[serde(default)]
    pub worker_threads: Option<usize>,
    #[serde(default = "default_grace")]
    pub shutdown_grace_secs: u64,
    #[serde(default = "default_origin")]
    pub allowed_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            worker_threads: Some(4),
            shutdown_grace_secs: default_grace(),
            allowed_origin: default_origin(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub client_ids: Vec<String>,
    /// Allows running without client IDs (no audience check).
    #[serde(default)]
    pub development: bool,
    #[serde(default = "default_jwks_url")]
    pub jwks_url: String,
    #[serde(default = "default_jwks_ttl")]
    pub jwks_ttl_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            client_ids: Vec::new(),
            development: false,
            jwks_url: default_jwks_url(),
            jwks_ttl_secs: default_jwks_ttl(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Where user saves are kept. Exactly one backend per process.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    Filesystem {
        root: String,
    },
    Gcs {
        bucket: String,
        #[serde(default = "default_gcs_endpoint")]
        endpoint: String,
        #[serde(default)]
        access_token: Option<String>,
        #[serde(default = "default_request_timeout")]
        request_timeout_secs: u64,
    },
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

fn default_addr() -> String { DEFAULT_ADDR.to_string() }
fn default_grace() -> u64 { 10 }
fn default_origin() -> String { "*".to_string() }
fn default_jwks_url() -> String { DEFAULT_JWKS_URL.to_string() }
fn default_jwks_ttl() -> u64 { 3600 }
fn default_request_timeout() -> u64 { 10 }
fn default_gcs_endpoint() -> String { DEFAULT_GCS_ENDPOINT.to_string() }

/// Read `CONFIG_PATH` (default `config.toml`). A missing file yields defaults.
pub fn load_default() -> Result<AppConfig> {
    let path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    load_optional(&path)
}

pub fn load_optional(path: &str) -> Result<AppConfig> {
    match std::fs::read_to_string(path) {
        Ok(content) => parse(&content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(e) => Err(anyhow!("cannot read {path}: {e}")),
    }
}

pub fn load_from_file(path: &str) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    parse(&content)
}

pub fn parse(content: &str) -> Result<AppConfig> {
    let cfg: AppConfig = toml::from_str(content)?;
    Ok(cfg)
}

impl AppConfig {
    /// File, then process environment, then validation.
    /// `development` comes from the command line and can only switch the mode on.
    pub fn load_and_validate(path: Option<&str>, development: bool) -> Result<Self> {
        let mut cfg = match path {
            Some(p) => load_from_file(p)?,
            None => load_default()?,
        };
        cfg.apply_env(|key| std::env::var(key).ok());
        cfg.auth.development |= development;
        cfg.normalize_and_validate()?;
        Ok(cfg)
    }

    /// Overlay `USERSAVE_*` variables. `lookup` abstracts the environment for tests.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("USERSAVE_ADDR") {
            self.server.addr = addr;
        }
        if let Some(threads) = lookup("TOKIO_WORKER_THREADS").and_then(|v| v.parse().ok()) {
            self.server.worker_threads = Some(threads);
        }
        if let Some(origin) = lookup("USERSAVE_ALLOWED_ORIGIN") {
            self.server.allowed_origin = origin;
        }
        if let Some(ids) = lookup("USERSAVE_CLIENT_ID") {
            self.auth.client_ids = ids
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(format) = lookup("USERSAVE_LOG_FORMAT") {
            match format.to_ascii_lowercase().as_str() {
                "json" => self.logging.format = LogFormat::Json,
                "compact" => self.logging.format = LogFormat::Compact,
                _ => {}
            }
        }

        if let Some(new_bucket) = lookup("USERSAVE_BUCKET") {
            let new_endpoint = lookup("USERSAVE_GCS_ENDPOINT");
            let new_token = lookup("USERSAVE_GCS_TOKEN");
            match &mut self.storage {
                // File settings survive unless their own variable is set.
                Some(StorageConfig::Gcs { bucket, endpoint, access_token, .. }) => {
                    *bucket = new_bucket;
                    if let Some(e) = new_endpoint {
                        *endpoint = e;
                    }
                    if new_token.is_some() {
                        *access_token = new_token;
                    }
                }
                _ => {
                    self.storage = Some(StorageConfig::Gcs {
                        bucket: new_bucket,
                        endpoint: new_endpoint.unwrap_or_else(default_gcs_endpoint),
                        access_token: new_token,
                        request_timeout_secs: default_request_timeout(),
                    });
                }
            }
        } else if let Some(root) = lookup("USERSAVE_STORE_ROOT") {
            self.storage = Some(StorageConfig::Filesystem { root });
        }
    }

    pub fn normalize_and_validate(&mut self) -> Result<()> {
        self.server.normalize()?;
        self.auth.validate()?;
        match &self.storage {
            None => return Err(anyhow!("no storage configured; set USERSAVE_STORE_ROOT or USERSAVE_BUCKET")),
            Some(storage) => storage.validate()?,
        }
        Ok(())
    }
}

impl ServerConfig {
    fn normalize(&mut self) -> Result<()> {
        self.addr = self.addr.trim().to_string();
        if self.addr.is_empty() {
            return Err(anyhow!("server.addr is empty"));
        }
        if self.shutdown_grace_secs == 0 {
            return Err(anyhow!("server.shutdown_grace_secs must be positive"));
        }
        // Same byte rule as an HTTP header value: visible ASCII, space or tab.
        if !self.allowed_origin.bytes().all(|b| b == b'\t' || (b' '..=b'~').contains(&b)) {
            return Err(anyhow!("server.allowed_origin is not a valid header value"));
        }
        if matches!(self.worker_threads, None | Some(0)) {
            self.worker_threads = Some(4);
        }
        Ok(())
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

impl AuthConfig {
    fn validate(&self) -> Result<()> {
        if self.client_ids.is_empty() && !self.development {
            return Err(anyhow!("client ID must be provided if server is not in development mode"));
        }
        if self.jwks_url.trim().is_empty() {
            return Err(anyhow!("auth.jwks_url is empty"));
        }
        if self.jwks_ttl_secs == 0 || self.request_timeout_secs == 0 {
            return Err(anyhow!("auth timeouts must be positive seconds"));
        }
        Ok(())
    }

    pub fn jwks_ttl(&self) -> Duration {
        Duration::from_secs(self.jwks_ttl_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl StorageConfig {
    fn validate(&self) -> Result<()> {
        match self {
            StorageConfig::Filesystem { root } if root.trim().is_empty() => {
                Err(anyhow!("no store root provided"))
            }
            StorageConfig::Gcs { bucket, .. } if bucket.trim().is_empty() => {
                Err(anyhow!("storage.bucket is empty"))
            }
            StorageConfig::Gcs { request_timeout_secs: 0, .. } => {
                Err(anyhow!("storage.request_timeout_secs must be positive"))
            }
            _ => Ok(()),
        }
    }
}
