//! Google ID token validation.
//!
//! Tokens are verified locally against Google's published signing keys.
//! The key set is fetched over HTTPS and cached for `jwks_ttl`.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, jwk::JwkSet, Algorithm, DecodingKey, Validation};
use moka::future::Cache;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::{TokenChecker, TokenError};

pub const GOOGLE_JWKS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";
const GOOGLE_ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];

#[derive(Debug, Clone)]
pub struct GoogleTokenConfig {
    /// Accepted audiences. Empty disables the audience check (development only).
    pub client_ids: Vec<String>,
    pub jwks_url: String,
    pub jwks_ttl: Duration,
    pub request_timeout: Duration,
}

impl Default for GoogleTokenConfig {
    fn default() -> Self {
        Self {
            client_ids: Vec::new(),
            jwks_url: GOOGLE_JWKS_URL.to_string(),
            jwks_ttl: Duration::from_secs(3600),
            request_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GoogleClaims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
}

pub struct GoogleTokenChecker {
    client: Client,
    jwks_url: String,
    validation: Validation,
    keys: Cache<String, Arc<JwkSet>>,
}

impl GoogleTokenChecker {
    pub fn new(cfg: GoogleTokenConfig) -> Result<Self, TokenError> {
        let client = Client::builder()
            .timeout(cfg.request_timeout)
            .build()
            .map_err(|e| TokenError::KeyFetch(e.to_string()))?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&GOOGLE_ISSUERS);
        if cfg.client_ids.is_empty() {
            validation.validate_aud = false;
        } else {
            validation.set_audience(&cfg.client_ids);
        }

        let keys = Cache::builder().max_capacity(4).time_to_live(cfg.jwks_ttl).build();
        Ok(Self { client, jwks_url: cfg.jwks_url, validation, keys })
    }

    async fn key_set(&self) -> Result<Arc<JwkSet>, TokenError> {
        self.keys
            .try_get_with(self.jwks_url.clone(), async {
                debug!(url = %self.jwks_url, "fetching signing keys");
                let set = self
                    .client
                    .get(&self.jwks_url)
                    .send()
                    .await?
                    .error_for_status()?
                    .json::<JwkSet>()
                    .await?;
                Ok::<_, reqwest::Error>(Arc::new(set))
            })
            .await
            .map_err(|e| TokenError::KeyFetch(e.to_string()))
    }

    async fn decoding_key(&self, kid: &str) -> Result<DecodingKey, TokenError> {
        let set = self.key_set().await?;
        let jwk = set.find(kid).ok_or_else(|| TokenError::UnknownKey(kid.to_string()))?;
        DecodingKey::from_jwk(jwk).map_err(|e| TokenError::KeyFetch(e.to_string()))
    }
}

#[async_trait]
impl TokenChecker for GoogleTokenChecker {
    #[instrument(skip_all)]
    async fn validate(&self, token: &str) -> Result<String, TokenError> {
        let header = decode_header(token).map_err(|e| TokenError::Malformed(e.to_string()))?;
        if header.alg != Algorithm::RS256 {
            return Err(TokenError::Malformed(format!("unexpected algorithm {:?}", header.alg)));
        }
        let kid = header
            .kid
            .ok_or_else(|| TokenError::Malformed("missing key id".into()))?;

        let key = self.decoding_key(&kid).await?;
        let data = decode::<GoogleClaims>(token, &key, &self.validation)
            .map_err(|e| TokenError::Rejected(e.to_string()))?;
        debug!(sub = %data.claims.sub, email = ?data.claims.email, "validated google id token");
        Ok(data.claims.sub)
    }
}
