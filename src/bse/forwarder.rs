// Outbound webhook forwarder — POSTs the computed score to an external
// consumer after every BSE computation (§4.1 "Forwarding"). Failure is
// logged, never reverses the persisted score update.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::retry::{with_backoff, BackoffConfig};

#[derive(Debug, Serialize)]
struct ForwardPayload<'a> {
    user_id: &'a str,
    behavior_score: f64,
    risk_flags: &'a [String],
    timestamp: DateTime<Utc>,
}

pub struct BseForwarder {
    client: reqwest::Client,
    webhook_url: String,
    backoff: BackoffConfig,
}

impl BseForwarder {
    pub fn new(webhook_url: String, timeout_secs: u64, max_retries: u32, exponential: bool) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            webhook_url,
            backoff: BackoffConfig {
                max_attempts: max_retries.max(1),
                base: std::time::Duration::from_secs(5),
                exponential,
            },
        }
    }

    /// Forward the score with retry. Returns `Err` on exhausted retries —
    /// callers log and move on; the persisted score update already happened.
    pub async fn forward(
        &self,
        user_id: &str,
        behavior_score: f64,
        risk_flags: &[String],
        timestamp: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        if self.webhook_url.is_empty() {
            return Ok(());
        }

        let payload = ForwardPayload {
            user_id,
            behavior_score,
            risk_flags,
            timestamp,
        };

        with_backoff(self.backoff, || async {
            let response = self
                .client
                .post(&self.webhook_url)
                .json(&payload)
                .send()
                .await
                .map_err(anyhow::Error::from)?;
            if response.status().is_success() {
                Ok(())
            } else {
                anyhow::bail!("webhook forward returned status {}", response.status())
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_webhook_url_is_a_no_op() {
        let forwarder = BseForwarder::new(String::new(), 10, 3, true);
        let result = forwarder
            .forward("u1", 90.0, &["new_account".to_string()], Utc::now())
            .await;
        assert!(result.is_ok());
    }
}
