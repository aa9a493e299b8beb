// Passkey format `<scope>:<hex-mac>:<unix-ts>`, grounded in
// `original_source/src/agk.py`'s `PasskeyGenerator` (same three-part
// colon format, same 24h expiry, same HMAC-over-identity-string shape).
// MAC verification uses the shared constant-time comparison
// (`crypto::hmac_verify`) rather than reimplementing it here.

use chrono::{DateTime, TimeZone, Utc};

use crate::crypto;
use crate::model::{Passkey, PasskeyScope};

pub const EXPIRY_HOURS: i64 = 24;

/// Parses a raw `<scope>:<mac>:<unix-ts>` string. Does not check expiry
/// or verify the MAC — see `is_valid`/`verify`.
pub fn parse(raw: &str) -> Option<Passkey> {
    let mut parts = raw.splitn(3, ':');
    let scope = PasskeyScope::parse(parts.next()?)?;
    let mac = parts.next()?.to_string();
    let ts: i64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    let issued_at = Utc.timestamp_opt(ts, 0).single()?;
    Some(Passkey { scope, mac, issued_at })
}

/// `now - issued_at < expiry_hours` — the only check AGK's baseline
/// decision (§4.5 step 3) requires before trusting a passkey's
/// embedded access level.
pub fn is_valid(passkey: &Passkey, now: DateTime<Utc>, expiry_hours: i64) -> bool {
    now.signed_duration_since(passkey.issued_at) < chrono::Duration::hours(expiry_hours)
}

/// Verifies the MAC against `secret` for the given `user_id`, constant-time.
pub fn verify(passkey: &Passkey, secret: &str, user_id: &str) -> bool {
    let payload = format!("{}:{}:{}", passkey.scope.as_str(), user_id, passkey.issued_at.timestamp());
    crypto::hmac_verify(secret, &payload, &passkey.mac)
}

/// Issues a new passkey string for `user_id` under `scope`, signed with
/// `secret`.
pub fn issue(scope: PasskeyScope, secret: &str, user_id: &str, issued_at: DateTime<Utc>) -> String {
    let ts = issued_at.timestamp();
    let payload = format!("{}:{}:{}", scope.as_str(), user_id, ts);
    let mac = crypto::hmac_sign(secret, &payload);
    format!("{}:{}:{}", scope.as_str(), mac, ts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_then_parse_roundtrips() {
        let now = Utc::now();
        let raw = issue(PasskeyScope::Wallet, "secret", "u1", now);
        let parsed = parse(&raw).expect("parses");
        assert_eq!(parsed.scope, PasskeyScope::Wallet);
        assert_eq!(parsed.issued_at.timestamp(), now.timestamp());
    }

    #[test]
    fn test_issue_then_verify_succeeds() {
        let now = Utc::now();
        let raw = issue(PasskeyScope::Session, "secret", "u1", now);
        let parsed = parse(&raw).unwrap();
        assert!(verify(&parsed, "secret", "u1"));
        assert!(!verify(&parsed, "wrong-secret", "u1"));
        assert!(!verify(&parsed, "secret", "other-user"));
    }

    #[test]
    fn test_malformed_passkey_fails_to_parse() {
        assert!(parse("not-enough-parts").is_none());
        assert!(parse("unknown_scope:mac:1234").is_none());
        assert!(parse("wallet:mac:not-a-number").is_none());
    }

    #[test]
    fn test_expiry_boundary() {
        let now = Utc::now();
        let fresh = Passkey { scope: PasskeyScope::Wallet, mac: "m".into(), issued_at: now - chrono::Duration::hours(23) };
        let stale = Passkey { scope: PasskeyScope::Wallet, mac: "m".into(), issued_at: now - chrono::Duration::hours(25) };
        assert!(is_valid(&fresh, now, EXPIRY_HOURS));
        assert!(!is_valid(&stale, now, EXPIRY_HOURS));
    }
}
