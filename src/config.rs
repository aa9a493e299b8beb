use std::env;

use anyhow::Result;

/// Central configuration loaded from environment variables.
///
/// All secrets come from env vars (never hardcoded). The .env file is
/// loaded automatically at startup via dotenvy.
pub struct Config {
    pub database_url: String,
    pub db_path: String,
    pub webhook_secret: String,
    pub webhook_bearer_token: String,
    pub token_encryption_key: String,

    pub webhook_auth_method: WebhookAuthMethod,
    pub webhook_max_retries: u32,
    pub webhook_timeout_secs: u64,
    pub webhook_exponential_backoff: bool,

    pub bot_detection_enabled: bool,
    pub min_behavior_score: f64,
    pub dashboard_refresh_seconds: u64,
    pub fake_referral_grace_hours: i64,

    /// Outbound BSE forward target. Empty disables forwarding.
    pub bse_webhook_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookAuthMethod {
    Signature,
    Token,
}

impl WebhookAuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookAuthMethod::Signature => "signature",
            WebhookAuthMethod::Token => "token",
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Only `db_path` and the documented defaults below are optional —
    /// the webhook secret/token and token-encryption key are required
    /// for anything beyond `init` and `status`; check with `require_*`.
    pub fn load() -> Result<Self> {
        let webhook_auth_method = match env::var("WEBHOOK_AUTH_METHOD")
            .unwrap_or_else(|_| "signature".to_string())
            .as_str()
        {
            "token" => WebhookAuthMethod::Token,
            _ => WebhookAuthMethod::Signature,
        };

        Ok(Self {
            database_url: env::var("DATABASE_URL").unwrap_or_default(),
            db_path: env::var("SENTRYGATE_DB_PATH").unwrap_or_else(|_| "./sentrygate.db".to_string()),
            webhook_secret: env::var("WEBHOOK_SECRET").unwrap_or_default(),
            webhook_bearer_token: env::var("WEBHOOK_BEARER_TOKEN").unwrap_or_default(),
            token_encryption_key: env::var("TOKEN_ENCRYPTION_KEY").unwrap_or_default(),

            webhook_auth_method,
            webhook_max_retries: env::var("WEBHOOK_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),
            webhook_timeout_secs: env::var("WEBHOOK_TIMEOUT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            webhook_exponential_backoff: env::var("WEBHOOK_EXPONENTIAL_BACKOFF")
                .ok()
                .map(|v| v == "true" || v == "1")
                .unwrap_or(true),

            bot_detection_enabled: env::var("BOT_DETECTION_ENABLED")
                .ok()
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
            min_behavior_score: env::var("MIN_BEHAVIOR_SCORE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60.0),
            dashboard_refresh_seconds: env::var("DASHBOARD_REFRESH_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            fake_referral_grace_hours: env::var("FAKE_REFERRAL_GRACE_HOURS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(24),

            bse_webhook_url: env::var("WEBHOOK_URL").unwrap_or_default(),
        })
    }

    /// Check that a webhook auth secret/token is configured for the
    /// selected auth method. Call this before serving ingress traffic.
    pub fn require_webhook_auth(&self) -> Result<()> {
        match self.webhook_auth_method {
            WebhookAuthMethod::Signature if self.webhook_secret.is_empty() => {
                anyhow::bail!(
                    "WEBHOOK_SECRET not set. Add it to your .env file.\n\
                     See .env.example for the required variables."
                );
            }
            WebhookAuthMethod::Token if self.webhook_bearer_token.is_empty() => {
                anyhow::bail!(
                    "WEBHOOK_BEARER_TOKEN not set. Add it to your .env file.\n\
                     See .env.example for the required variables."
                );
            }
            _ => {}
        }
        Ok(())
    }

    /// Check that the token-encryption key is configured.
    pub fn require_token_encryption_key(&self) -> Result<()> {
        if self.token_encryption_key.is_empty() {
            anyhow::bail!(
                "TOKEN_ENCRYPTION_KEY not set. Add it to your .env file.\n\
                 See .env.example for the required variables."
            );
        }
        Ok(())
    }
}

// Allow the status module (in the library crate) to read db_path
// without depending on this binary-only config module.
impl sentrygate::status::HasDbPath for Config {
    fn db_path(&self) -> &str {
        &self.db_path
    }
}
