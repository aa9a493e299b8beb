// Shared cryptographic primitives: constant-time comparison, HMAC-SHA256
// signing, and the device fingerprint hash. Used by ingress auth, AGK
// passkey validation, and the MAF collector.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Constant-time string comparison to prevent timing attacks.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

/// Sign `payload` with `secret`, returning the hex-encoded HMAC-SHA256.
pub fn hmac_sign(secret: &str, payload: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| HmacSha256::new_from_slice(b"fallback").unwrap());
    mac.update(payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a hex-encoded HMAC-SHA256 signature over `payload`.
pub fn hmac_verify(secret: &str, payload: &str, signature_hex: &str) -> bool {
    constant_time_eq(&hmac_sign(secret, payload), signature_hex)
}

/// Compute a FingerprintRecord's `device_hash`: a SHA-256 over a fixed,
/// ordered concatenation of (ip, ua, screen, tz, lang, platform,
/// canvas_fp, webgl_fp). Stable for identical inputs (§3 invariant).
#[allow(clippy::too_many_arguments)]
pub fn device_hash(
    ip: &str,
    ua: &str,
    screen: &str,
    tz: &str,
    lang: &str,
    platform: &str,
    canvas_fp: &str,
    webgl_fp: &str,
) -> String {
    let mut hasher = Sha256::new();
    for part in [ip, ua, screen, tz, lang, platform, canvas_fp, webgl_fp] {
        hasher.update(part.as_bytes());
        hasher.update(b"|");
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_eq_matches_and_mismatches() {
        assert!(constant_time_eq("abc", "abc"));
        assert!(!constant_time_eq("abc", "abd"));
        assert!(!constant_time_eq("abc", "abcd"));
    }

    #[test]
    fn test_hmac_roundtrip() {
        let sig = hmac_sign("secret", "payload");
        assert!(hmac_verify("secret", "payload", &sig));
        assert!(!hmac_verify("wrong", "payload", &sig));
    }

    #[test]
    fn test_device_hash_is_stable_for_identical_inputs() {
        let h1 = device_hash("1.2.3.4", "UA", "1920x1080", "UTC", "en", "linux", "c1", "w1");
        let h2 = device_hash("1.2.3.4", "UA", "1920x1080", "UTC", "en", "linux", "c1", "w1");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
    }

    #[test]
    fn test_device_hash_differs_on_any_field_change() {
        let h1 = device_hash("1.2.3.4", "UA", "1920x1080", "UTC", "en", "linux", "c1", "w1");
        let h2 = device_hash("1.2.3.5", "UA", "1920x1080", "UTC", "en", "linux", "c1", "w1");
        assert_ne!(h1, h2);
    }
}
