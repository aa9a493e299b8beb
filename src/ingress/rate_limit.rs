// Per-key fixed-window rate limiter. Grounded in
// `toxicity::rate_limiter::RateLimiter`'s `Arc<Mutex<inner>>` shape,
// generalized from one global waiter to many independently-tracked keys
// (remote addresses) that reject instead of blocking once exhausted —
// §5's "per-key mutual exclusion suffices" requirement.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Mutex<HashMap<String, Vec<Instant>>>>,
    limit: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self { inner: Arc::new(Mutex::new(HashMap::new())), limit, window }
    }

    pub fn per_hour(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(3600))
    }

    /// Records a request for `key`. Returns `true` if it's allowed,
    /// `false` if `key` is already at its limit within the window.
    pub async fn check(&self, key: &str) -> bool {
        let mut state = self.inner.lock().await;
        let now = Instant::now();
        let entry = state.entry(key.to_string()).or_default();
        entry.retain(|&seen| now.duration_since(seen) < self.window);

        if entry.len() as u32 >= self.limit {
            return false;
        }
        entry.push(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_allows_up_to_limit() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        assert!(limiter.check("1.2.3.4").await);
        assert!(limiter.check("1.2.3.4").await);
        assert!(!limiter.check("1.2.3.4").await);
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.check("a").await);
        assert!(limiter.check("b").await);
        assert!(!limiter.check("a").await);
    }
}
