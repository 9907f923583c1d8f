use std::time::{Duration, Instant};

use dashmap::DashMap;
use gateway_core::ConfirmationEnvelope;

const DEFAULT_TTL_SECS: u64 = 300;

struct Entry {
    envelope: ConfirmationEnvelope,
    expires_at: Instant,
}

/// Caches pending write confirmations between the propose (4.J Stage 4) and
/// commit (4.K) steps of a two-phase write.
pub struct ConfirmationStore {
    entries: DashMap<String, Entry>,
}

impl ConfirmationStore {
    pub fn new() -> Self {
        Self { entries: DashMap::new() }
    }

    pub fn put(&self, envelope: ConfirmationEnvelope, ttl_secs: Option<u64>) {
        let expires_at = Instant::now() + Duration::from_secs(ttl_secs.unwrap_or(DEFAULT_TTL_SECS));
        self.entries
            .insert(envelope.confirmation_id.clone(), Entry { envelope, expires_at });
    }

    /// Atomically read-and-delete. `DashMap::remove` takes the shard's write
    /// lock for the whole operation, so no other caller can observe the entry
    /// between the expiry check and the removal — a second call for the same
    /// id always sees `None`.
    pub fn take_once(&self, confirmation_id: &str) -> Option<ConfirmationEnvelope> {
        let (_, entry) = self.entries.remove(confirmation_id)?;
        if entry.expires_at > Instant::now() {
            Some(entry.envelope)
        } else {
            None
        }
    }
}

impl Default for ConfirmationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(id: &str) -> ConfirmationEnvelope {
        ConfirmationEnvelope {
            confirmation_id: id.to_string(),
            action: "update_invoice".to_string(),
            mcp_server: "billing".to_string(),
            user_id: "u1".to_string(),
            created_at: 0,
            extra: json!({"invoiceId": "inv-1"}),
        }
    }

    #[test]
    fn take_once_returns_the_envelope_then_nothing() {
        let store = ConfirmationStore::new();
        store.put(envelope("c1"), None);
        assert!(store.take_once("c1").is_some());
        assert!(store.take_once("c1").is_none());
    }

    #[test]
    fn unknown_id_returns_none() {
        let store = ConfirmationStore::new();
        assert!(store.take_once("missing").is_none());
    }

    #[test]
    fn expired_entry_is_treated_as_gone() {
        let store = ConfirmationStore::new();
        store.put(envelope("c1"), Some(0));
        std::thread::sleep(Duration::from_millis(5));
        assert!(store.take_once("c1").is_none());
    }
}
