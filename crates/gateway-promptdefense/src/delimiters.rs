use std::time::{Duration, Instant};

use dashmap::DashMap;
use rand::RngCore;

const TTL: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone)]
pub struct DelimiterPair {
    pub open: String,
    pub close: String,
}

impl DelimiterPair {
    fn static_fallback() -> Self {
        Self {
            open: "<user_query>".to_string(),
            close: "</user_query>".to_string(),
        }
    }

    fn generate() -> Self {
        let mut bytes = [0u8; 8];
        rand::thread_rng().fill_bytes(&mut bytes);
        let tag = hex::encode(bytes);
        Self {
            open: format!("<query_{tag}>"),
            close: format!("</query_{tag}>"),
        }
    }
}

struct Entry {
    pair: DelimiterPair,
    created_at: Instant,
}

/// Caches a per-session delimiter pair for 30 minutes. First writer for a
/// session id wins; concurrent first calls for the same id may each generate
/// a candidate pair, but only one is ever observed by callers.
pub struct DelimiterCache {
    entries: DashMap<String, Entry>,
}

impl DelimiterCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Returns the static fallback when `session_id` is `None`.
    pub fn get_or_create(&self, session_id: Option<&str>) -> DelimiterPair {
        let Some(session_id) = session_id else {
            return DelimiterPair::static_fallback();
        };

        if let Some(entry) = self.entries.get(session_id) {
            if entry.created_at.elapsed() < TTL {
                return entry.pair.clone();
            }
        }

        // Race window: two concurrent first-callers for the same session may
        // both reach here and both generate a pair. `entry().or_insert_with`
        // only inserts into a vacant slot, so whichever wins the race below
        // is the pair every subsequent caller (including the loser) observes.
        let pair = DelimiterPair::generate();
        self.entries.remove(session_id);
        let entry = self.entries.entry(session_id.to_string()).or_insert_with(|| Entry {
            pair: pair.clone(),
            created_at: Instant::now(),
        });
        entry.pair.clone()
    }
}

impl Default for DelimiterCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_session_id_returns_static_tags() {
        let cache = DelimiterCache::new();
        let pair = cache.get_or_create(None);
        assert_eq!(pair.open, "<user_query>");
        assert_eq!(pair.close, "</user_query>");
    }

    #[test]
    fn same_session_reuses_the_same_pair() {
        let cache = DelimiterCache::new();
        let first = cache.get_or_create(Some("session-1"));
        let second = cache.get_or_create(Some("session-1"));
        assert_eq!(first.open, second.open);
        assert_eq!(first.close, second.close);
    }

    #[test]
    fn different_sessions_get_different_pairs() {
        let cache = DelimiterCache::new();
        let a = cache.get_or_create(Some("session-a"));
        let b = cache.get_or_create(Some("session-b"));
        assert_ne!(a.open, b.open);
    }

    #[test]
    fn generated_tags_have_16_hex_char_ids() {
        let cache = DelimiterCache::new();
        let pair = cache.get_or_create(Some("session-x"));
        let id = pair.open.trim_start_matches("<query_").trim_end_matches('>');
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
