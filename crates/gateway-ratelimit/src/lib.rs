use std::num::NonZeroU32;

use governor::clock::DefaultClock;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter as GovernorLimiter};
use nonzero_ext::nonzero;

type KeyedLimiter = GovernorLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// 4.M Rate Limiter. Two independently-keyed token buckets: a general one
/// covering every API route, and a stricter one applied only to query
/// endpoints. Key = `caller.userId` when authenticated, else client IP —
/// callers decide which to pass.
pub struct RateLimiter {
    general: KeyedLimiter,
    query: KeyedLimiter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitBucket {
    General,
    Query,
}

impl RateLimiter {
    pub fn new(general_per_min: u32, query_per_min: u32) -> Self {
        Self {
            general: GovernorLimiter::keyed(quota_per_minute(general_per_min)),
            query: GovernorLimiter::keyed(quota_per_minute(query_per_min)),
        }
    }

    /// `true` if the request is within budget (and consumes one unit);
    /// `false` if the caller should be rejected with 429.
    pub fn check(&self, bucket: RateLimitBucket, key: &str) -> bool {
        let limiter = match bucket {
            RateLimitBucket::General => &self.general,
            RateLimitBucket::Query => &self.query,
        };
        limiter.check_key(&key.to_string()).is_ok()
    }
}

fn quota_per_minute(per_min: u32) -> Quota {
    let n = NonZeroU32::new(per_min).unwrap_or(nonzero!(1u32));
    Quota::per_minute(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_requests_within_budget() {
        let limiter = RateLimiter::new(5, 2);
        for _ in 0..2 {
            assert!(limiter.check(RateLimitBucket::Query, "user-1"));
        }
    }

    #[test]
    fn rejects_once_query_budget_is_exhausted() {
        let limiter = RateLimiter::new(500, 1);
        assert!(limiter.check(RateLimitBucket::Query, "user-1"));
        assert!(!limiter.check(RateLimitBucket::Query, "user-1"));
    }

    #[test]
    fn buckets_are_independent_per_key() {
        let limiter = RateLimiter::new(500, 1);
        assert!(limiter.check(RateLimitBucket::Query, "user-1"));
        assert!(limiter.check(RateLimitBucket::Query, "user-2"));
    }

    #[test]
    fn general_and_query_buckets_are_independent() {
        let limiter = RateLimiter::new(500, 1);
        assert!(limiter.check(RateLimitBucket::Query, "user-1"));
        assert!(!limiter.check(RateLimitBucket::Query, "user-1"));
        assert!(limiter.check(RateLimitBucket::General, "user-1"));
    }
}
