use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Keyed store of revoked token ids, each with its own expiry. Entries are
/// swept lazily on `is_revoked`/`revoke` rather than by a background task —
/// the store never grows past the number of distinct revoked tokens in the
/// TTL window, which is small relative to request volume.
pub struct RevocationStore {
    entries: DashMap<String, Instant>,
    default_ttl: Duration,
}

impl RevocationStore {
    pub fn new(default_ttl_secs: u64) -> Self {
        Self {
            entries: DashMap::new(),
            default_ttl: Duration::from_secs(default_ttl_secs),
        }
    }

    pub fn revoke(&self, token_id: &str, ttl: Option<Duration>) {
        let expires_at = Instant::now() + ttl.unwrap_or(self.default_ttl);
        self.entries.insert(token_id.to_string(), expires_at);
    }

    pub fn is_revoked(&self, token_id: &str) -> bool {
        let still_valid = match self.entries.get(token_id) {
            Some(expires_at) => Some(*expires_at > Instant::now()),
            None => None,
        };
        match still_valid {
            Some(true) => true,
            Some(false) => {
                self.entries.remove(token_id);
                false
            }
            None => false,
        }
    }
}
