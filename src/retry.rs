// Shared retry-with-backoff primitive. Used by the BSE outbound webhook
// forwarder (§4.1) and SOL's per-job database retry discipline (§4.3):
// both call for "N attempts (default 3), exponential backoff (base 5s,
// optional), final failure logged/alerted" — one shared helper, two
// call sites.

use std::time::Duration;

use tokio::time::sleep;

/// Backoff configuration.
#[derive(Debug, Clone, Copy)]
pub struct BackoffConfig {
    pub max_attempts: u32,
    pub base: Duration,
    pub exponential: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base: Duration::from_secs(5),
            exponential: true,
        }
    }
}

impl BackoffConfig {
    /// Delay before the attempt numbered `attempt` (0-indexed: the delay
    /// taken *after* that attempt fails, before the next one).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if !self.exponential {
            return self.base;
        }
        self.base * 2u32.saturating_pow(attempt)
    }
}

/// Run `f` up to `config.max_attempts` times, sleeping between attempts
/// per `config.delay_for`. Returns the last error if every attempt fails.
pub async fn with_backoff<T, E, F, Fut>(config: BackoffConfig, mut f: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                attempt += 1;
                if attempt >= config.max_attempts {
                    return Err(e);
                }
                sleep(config.delay_for(attempt - 1)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_exponential_delay_doubles() {
        let cfg = BackoffConfig {
            max_attempts: 3,
            base: Duration::from_secs(5),
            exponential: true,
        };
        assert_eq!(cfg.delay_for(0), Duration::from_secs(5));
        assert_eq!(cfg.delay_for(1), Duration::from_secs(10));
        assert_eq!(cfg.delay_for(2), Duration::from_secs(20));
    }

    #[tokio::test]
    async fn test_with_backoff_retries_until_success() {
        let attempts = AtomicU32::new(0);
        let cfg = BackoffConfig {
            max_attempts: 5,
            base: Duration::from_millis(1),
            exponential: false,
        };
        let result: Result<(), &str> = with_backoff(cfg, || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err("not yet")
                } else {
                    Ok(())
                }
            }
        })
        .await;
        assert!(result.is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_backoff_gives_up_after_max_attempts() {
        let attempts = AtomicU32::new(0);
        let cfg = BackoffConfig {
            max_attempts: 3,
            base: Duration::from_millis(1),
            exponential: false,
        };
        let result: Result<(), &str> = with_backoff(cfg, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async move { Err("always fails") }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
