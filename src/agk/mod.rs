// Access Gatekeeper — pure policy deciding whether a user may perform a
// privileged content operation. No I/O of its own: callers load the
// `User` and persist the resulting access-log row (§4.5 step 7, "best
// effort; never fail the decision on logging error").
//
// Grounded in `original_source/src/agk.py`'s `AssetGatekeeper`/
// `PasskeyGenerator`/`ContentValidator`, generalized from Supabase reads
// into a pure function over an already-loaded `User`.

pub mod content;
pub mod passkey;

use crate::config::Config;
use crate::model::User;

pub const MIN_BEHAVIOR_SCORE_DEFAULT: f64 = 60.0;
pub const HIGH_TRUST_THRESHOLD: f64 = 80.0;
pub const BASIC_ACCESS: &str = "BASIC_ACCESS";

#[derive(Debug, Clone, PartialEq)]
pub struct AccessDecision {
    pub granted: bool,
    pub access_level: Option<String>,
    pub reason: Option<&'static str>,
}

impl AccessDecision {
    fn denied(reason: &'static str) -> Self {
        Self { granted: false, access_level: None, reason: Some(reason) }
    }

    fn granted(access_level: impl Into<String>) -> Self {
        Self { granted: true, access_level: Some(access_level.into()), reason: None }
    }
}

/// Steps 1-5 of §4.5's algorithm: the baseline access decision, with no
/// upload-specific content checks.
pub fn evaluate(user: Option<&User>, min_behavior_score: f64) -> AccessDecision {
    let Some(user) = user else {
        return AccessDecision::denied("user_not_found");
    };

    if user.behavior_score < min_behavior_score {
        return AccessDecision::denied("low_score");
    }

    if let Some(raw) = user.metadata.get("passkey").and_then(|v| v.as_str()) {
        if let Some(parsed) = passkey::parse(raw) {
            if passkey::is_valid(&parsed, chrono::Utc::now(), passkey::EXPIRY_HOURS) {
                let access_level = user
                    .metadata
                    .get("access_level")
                    .and_then(|v| v.as_str())
                    .unwrap_or(BASIC_ACCESS);
                return AccessDecision::granted(access_level);
            }
        }
    }

    if user.behavior_score >= HIGH_TRUST_THRESHOLD {
        return AccessDecision::granted(BASIC_ACCESS);
    }

    AccessDecision::denied("no_passkey")
}

/// Step 6: additionally validate upload content type and size.
pub fn evaluate_upload(
    user: Option<&User>,
    min_behavior_score: f64,
    content_type: &str,
    content_length: u64,
) -> AccessDecision {
    let decision = evaluate(user, min_behavior_score);
    if !decision.granted {
        return decision;
    }
    if let Err(_errors) = content::validate(content_type, content_length) {
        return AccessDecision::denied("invalid_content");
    }
    decision
}

pub fn min_behavior_score(config: &Config) -> f64 {
    if config.min_behavior_score > 0.0 {
        config.min_behavior_score
    } else {
        MIN_BEHAVIOR_SCORE_DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user_with(score: f64, metadata: serde_json::Value) -> User {
        User {
            id: "u1".into(),
            behavior_score: score,
            created_at: Utc::now(),
            is_verified: false,
            weekly_score: 0.0,
            last_updated: Utc::now(),
            metadata,
        }
    }

    #[test]
    fn test_missing_user_is_denied() {
        let decision = evaluate(None, 60.0);
        assert!(!decision.granted);
        assert_eq!(decision.reason, Some("user_not_found"));
    }

    #[test]
    fn test_low_score_is_denied() {
        let user = user_with(40.0, serde_json::json!({}));
        let decision = evaluate(Some(&user), 60.0);
        assert_eq!(decision.reason, Some("low_score"));
    }

    #[test]
    fn test_high_score_without_passkey_grants_basic_access() {
        let user = user_with(85.0, serde_json::json!({}));
        let decision = evaluate(Some(&user), 60.0);
        assert!(decision.granted);
        assert_eq!(decision.access_level.as_deref(), Some(BASIC_ACCESS));
    }

    #[test]
    fn test_mid_score_without_passkey_is_denied() {
        let user = user_with(70.0, serde_json::json!({}));
        let decision = evaluate(Some(&user), 60.0);
        assert_eq!(decision.reason, Some("no_passkey"));
    }

    #[test]
    fn test_valid_passkey_grants_metadata_access_level() {
        let raw = passkey::issue(crate::model::PasskeyScope::Wallet, "secret", "u1", Utc::now());
        let user = user_with(70.0, serde_json::json!({"passkey": raw, "access_level": "FULL_ACCESS"}));
        let decision = evaluate(Some(&user), 60.0);
        assert!(decision.granted);
        assert_eq!(decision.access_level.as_deref(), Some("FULL_ACCESS"));
    }

    #[test]
    fn test_expired_passkey_falls_through_to_score_check() {
        let stale = Utc::now() - chrono::Duration::hours(25);
        let raw = passkey::issue(crate::model::PasskeyScope::Session, "secret", "u1", stale);
        let user = user_with(85.0, serde_json::json!({"passkey": raw}));
        let decision = evaluate(Some(&user), 60.0);
        assert!(decision.granted);
        assert_eq!(decision.access_level.as_deref(), Some(BASIC_ACCESS));
    }

    #[test]
    fn test_upload_rejects_bad_content_type() {
        let user = user_with(90.0, serde_json::json!({}));
        let decision = evaluate_upload(Some(&user), 60.0, "application/x-executable", 1024);
        assert!(!decision.granted);
        assert_eq!(decision.reason, Some("invalid_content"));
    }
}
