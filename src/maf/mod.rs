// Multi-Layer Anomaly Flagger — runs the pattern bank over a window of
// fingerprint records, derives a per-event flag color, and combines it
// with BSE's risk level into a final severity (§4.2).
//
// Pattern isolation: a pattern that fails to evaluate is logged and
// skipped, the rest of the bank still runs. There is no shared mutable
// state between patterns so a panic-free `detect` is the whole contract;
// `run_bank` additionally guards with `catch_unwind` since detectors are
// third-party-extensible via `PatternDetector`.

pub mod patterns;

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;

use chrono::{DateTime, Duration, Utc};

use crate::model::{Anomaly, FinalRiskAssessment, FingerprintRecord, FlagColor, RiskLevel, VelocityScore};
use patterns::PatternDetector;

/// Confidence source for a fingerprint read. Real deployments can plug in
/// a third-party device-identity service; the default never blocks on an
/// external call.
pub trait IdentityProvider: Send + Sync {
    fn confidence_for(&self, visitor_id: &str) -> f64;
}

/// No external identity service configured — flat default confidence,
/// matching the upstream collector's fallback value.
pub struct DefaultIdentityProvider;

impl IdentityProvider for DefaultIdentityProvider {
    fn confidence_for(&self, _visitor_id: &str) -> f64 {
        0.8
    }
}

/// Extracts the client IP from proxy headers in priority order, matching
/// the header precedence used upstream. `x-forwarded-for` may carry a
/// comma-separated chain; the first hop is the client.
pub fn extract_ip_address(headers: &[(&str, &str)]) -> Option<String> {
    const HEADER_PRIORITY: &[&str] = &[
        "x-forwarded-for",
        "x-real-ip",
        "remote-addr",
        "client-ip",
        "x-client-ip",
    ];

    for wanted in HEADER_PRIORITY {
        if let Some((_, value)) = headers.iter().find(|(k, _)| k.eq_ignore_ascii_case(wanted)) {
            let candidate = value.split(',').next().unwrap_or(value).trim();
            if !candidate.is_empty() && candidate != "127.0.0.1" {
                return Some(candidate.to_string());
            }
        }
    }
    None
}

/// Run every pattern in the bank over the record window, isolating
/// failures per-pattern.
pub fn run_bank(
    bank: &[Box<dyn PatternDetector>],
    records: &[FingerprintRecord],
    now: DateTime<Utc>,
) -> Vec<Anomaly> {
    let mut anomalies = Vec::new();
    for pattern in bank {
        let result = std::panic::catch_unwind(AssertUnwindSafe(|| pattern.detect(records, now)));
        match result {
            Ok(found) => anomalies.extend(found),
            Err(_) => {
                tracing::warn!(pattern = pattern.name(), "pattern detector panicked, skipping");
            }
        }
    }
    anomalies
}

/// MAF's own velocity read over a user's recent activity, independent of
/// BSE's scoring-oriented `bse::velocity` (same thresholds, used only to
/// pick a flag color here).
pub fn classify_velocity(records: &[FingerprintRecord], now: DateTime<Utc>) -> VelocityScore {
    let five_min_ago = now - Duration::minutes(5);
    let hour_ago = now - Duration::hours(1);

    let events_5min = records.iter().filter(|r| r.timestamp > five_min_ago).count();
    let hourly: Vec<&FingerprintRecord> = records.iter().filter(|r| r.timestamp > hour_ago).collect();
    let unique_ips_hour: HashSet<&str> = hourly.iter().map(|r| r.ip.as_str()).collect();

    if events_5min >= 10 || hourly.len() >= 60 || unique_ips_hour.len() >= 5 {
        VelocityScore::High
    } else if events_5min >= 5 || hourly.len() >= 30 || unique_ips_hour.len() >= 3 {
        VelocityScore::Medium
    } else {
        VelocityScore::Low
    }
}

/// Six-branch flag color algorithm (§4.2). `behavior_score` is `None`
/// when BSE hasn't scored this user yet (first event).
pub fn determine_flag_color(
    behavior_score: Option<f64>,
    has_high_anomaly: bool,
    has_any_anomaly: bool,
    velocity: VelocityScore,
) -> FlagColor {
    if has_high_anomaly {
        return FlagColor::Red;
    }

    match behavior_score {
        None => {
            if has_any_anomaly || velocity == VelocityScore::High {
                FlagColor::Yellow
            } else {
                FlagColor::Green
            }
        }
        Some(score) => {
            if score < 50.0 {
                FlagColor::Red
            } else if (50.0..=79.0).contains(&score)
                && (has_any_anomaly || matches!(velocity, VelocityScore::Medium | VelocityScore::High))
            {
                FlagColor::Yellow
            } else if score > 80.0 && velocity == VelocityScore::Low && !has_any_anomaly {
                FlagColor::Green
            } else {
                FlagColor::Yellow
            }
        }
    }
}

/// Combines BSE's risk level with MAF's flag color into the final
/// severity. The five combinations named in §4.2 are explicit; anything
/// else (e.g. a `Normal` user who still turns up `Green`, which the
/// pattern bank can't actually produce today but the type system allows)
/// defaults to `Medium`.
pub fn final_risk_assessment(risk_level: RiskLevel, flag_color: FlagColor) -> FinalRiskAssessment {
    match (risk_level, flag_color) {
        (RiskLevel::Suspicious, FlagColor::Red) => FinalRiskAssessment::Critical,
        (RiskLevel::Suspicious, FlagColor::Yellow) => FinalRiskAssessment::High,
        (RiskLevel::Normal, FlagColor::Red) => FinalRiskAssessment::High,
        (RiskLevel::Normal, FlagColor::Green) => FinalRiskAssessment::Low,
        (RiskLevel::HighlyTrusted, FlagColor::Green) => FinalRiskAssessment::VeryLow,
        _ => FinalRiskAssessment::Medium,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_ip_prefers_x_forwarded_for() {
        let headers = [("X-Forwarded-For", "9.9.9.9, 10.0.0.1"), ("X-Real-IP", "8.8.8.8")];
        assert_eq!(extract_ip_address(&headers), Some("9.9.9.9".to_string()));
    }

    #[test]
    fn test_extract_ip_skips_loopback() {
        let headers = [("X-Forwarded-For", "127.0.0.1"), ("X-Real-IP", "8.8.8.8")];
        assert_eq!(extract_ip_address(&headers), Some("8.8.8.8".to_string()));
    }

    #[test]
    fn test_extract_ip_none_when_absent() {
        assert_eq!(extract_ip_address(&[]), None);
    }

    #[test]
    fn test_high_anomaly_always_red() {
        assert_eq!(
            determine_flag_color(Some(95.0), true, true, VelocityScore::Low),
            FlagColor::Red
        );
    }

    #[test]
    fn test_no_score_yet_with_no_anomaly_is_green() {
        assert_eq!(
            determine_flag_color(None, false, false, VelocityScore::Low),
            FlagColor::Green
        );
    }

    #[test]
    fn test_no_score_yet_with_high_velocity_is_yellow() {
        assert_eq!(
            determine_flag_color(None, false, false, VelocityScore::High),
            FlagColor::Yellow
        );
    }

    #[test]
    fn test_low_score_is_red() {
        assert_eq!(
            determine_flag_color(Some(40.0), false, false, VelocityScore::Low),
            FlagColor::Red
        );
    }

    #[test]
    fn test_mid_score_with_anomaly_is_yellow() {
        assert_eq!(
            determine_flag_color(Some(65.0), false, true, VelocityScore::Low),
            FlagColor::Yellow
        );
    }

    #[test]
    fn test_high_score_clean_is_green() {
        assert_eq!(
            determine_flag_color(Some(85.0), false, false, VelocityScore::Low),
            FlagColor::Green
        );
    }

    #[test]
    fn test_matrix_explicit_combinations() {
        assert_eq!(
            final_risk_assessment(RiskLevel::Suspicious, FlagColor::Red),
            FinalRiskAssessment::Critical
        );
        assert_eq!(
            final_risk_assessment(RiskLevel::Suspicious, FlagColor::Yellow),
            FinalRiskAssessment::High
        );
        assert_eq!(
            final_risk_assessment(RiskLevel::Normal, FlagColor::Red),
            FinalRiskAssessment::High
        );
        assert_eq!(
            final_risk_assessment(RiskLevel::Normal, FlagColor::Green),
            FinalRiskAssessment::Low
        );
        assert_eq!(
            final_risk_assessment(RiskLevel::HighlyTrusted, FlagColor::Green),
            FinalRiskAssessment::VeryLow
        );
    }

    #[test]
    fn test_matrix_default_is_medium() {
        assert_eq!(
            final_risk_assessment(RiskLevel::HighlyTrusted, FlagColor::Red),
            FinalRiskAssessment::Medium
        );
    }
}
