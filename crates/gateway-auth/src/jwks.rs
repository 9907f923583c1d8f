use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::jwk::JwkSet;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{AuthError, Result};

/// Fetches and caches a JWKS document, re-fetching after `ttl` elapses.
///
/// A single in-flight fetch is not de-duplicated across concurrent callers;
/// under normal load the cache hit rate is high enough that this is not worth
/// the extra bookkeeping a `OnceCell`-per-fetch would add.
pub struct JwksCache {
    url: String,
    ttl: Duration,
    client: reqwest::Client,
    state: RwLock<Option<CachedSet>>,
}

struct CachedSet {
    keys: Arc<JwkSet>,
    fetched_at: Instant,
}

impl JwksCache {
    pub fn new(url: impl Into<String>, ttl_secs: u64) -> Self {
        Self {
            url: url.into(),
            ttl: Duration::from_secs(ttl_secs),
            client: reqwest::Client::new(),
            state: RwLock::new(None),
        }
    }

    /// Return the currently cached key set, refreshing first if it is stale
    /// or absent.
    pub async fn get(&self) -> Result<Arc<JwkSet>> {
        if let Some(cached) = self.state.read().await.as_ref() {
            if cached.fetched_at.elapsed() < self.ttl {
                return Ok(Arc::clone(&cached.keys));
            }
        }
        self.refresh().await
    }

    /// Force a re-fetch, used when a `kid` is not found in the cached set in
    /// case keys rotated since the last refresh.
    pub async fn refresh(&self) -> Result<Arc<JwkSet>> {
        debug!(url = %self.url, "fetching jwks");
        let resp = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| AuthError::JwksFetch(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(AuthError::JwksFetch(format!(
                "jwks endpoint returned {}",
                resp.status()
            )));
        }

        let set: JwkSet = resp
            .json()
            .await
            .map_err(|e| AuthError::JwksFetch(e.to_string()))?;
        let keys = Arc::new(set);

        let mut state = self.state.write().await;
        *state = Some(CachedSet {
            keys: Arc::clone(&keys),
            fetched_at: Instant::now(),
        });

        Ok(keys)
    }

    /// Look up a key by `kid`, refreshing once if it is missing from the
    /// cached set (handles key rotation without waiting out the full TTL).
    pub async fn find(&self, kid: &str) -> Result<jsonwebtoken::jwk::Jwk> {
        let set = self.get().await?;
        if let Some(jwk) = set.find(kid) {
            return Ok(jwk.clone());
        }

        warn!(kid, "key id not in cached jwks, forcing refresh");
        let set = self.refresh().await?;
        set.find(kid)
            .cloned()
            .ok_or_else(|| AuthError::KeyNotFound(kid.to_string()))
    }
}
