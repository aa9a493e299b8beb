// MAF pattern bank — each pattern declares (name, threshold, window) and a
// `detect` contract over the fingerprint stream. Grounded in the upstream
// `AnomalyPattern` base class and its seven concrete subclasses
// (SameIPSignupPattern, SameDeviceSignupPattern, RapidActionPattern,
// ReferralSpamPattern, DuplicateMemePattern, LoginVelocityPattern):
// same risk_score multipliers, same severities, same thresholds.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Duration, Utc};

use crate::model::{Anomaly, AnomalyStatus, EventType, FingerprintRecord, Severity};

/// A single anomaly-detection rule over the fingerprint stream.
pub trait PatternDetector: Send + Sync {
    fn name(&self) -> &'static str;
    fn threshold(&self) -> usize;
    fn window_minutes(&self) -> i64;

    /// Detection correctness: `now - window` is a strict half-open lower
    /// bound, `now` the upper bound. Events exactly on the boundary are
    /// excluded.
    fn window_records<'a>(
        &self,
        records: &'a [FingerprintRecord],
        now: DateTime<Utc>,
    ) -> Vec<&'a FingerprintRecord> {
        let lower = now - Duration::minutes(self.window_minutes());
        records
            .iter()
            .filter(|r| r.timestamp > lower && r.timestamp <= now)
            .collect()
    }

    fn detect(&self, records: &[FingerprintRecord], now: DateTime<Utc>) -> Vec<Anomaly>;
}

fn make_anomaly(
    pattern_name: &str,
    severity: Severity,
    affected_users: BTreeSet<String>,
    fingerprint_data: serde_json::Value,
    risk_score: f64,
    now: DateTime<Utc>,
) -> Anomaly {
    Anomaly {
        pattern_name: pattern_name.to_string(),
        severity,
        affected_users,
        fingerprint_data,
        risk_score: risk_score.min(100.0),
        detected_at: now,
        status: AnomalyStatus::Open,
    }
}

fn group_by<'a, K, F>(records: &[&'a FingerprintRecord], key_fn: F) -> HashMap<K, Vec<&'a FingerprintRecord>>
where
    K: std::hash::Hash + Eq,
    F: Fn(&FingerprintRecord) -> K,
{
    let mut groups: HashMap<K, Vec<&FingerprintRecord>> = HashMap::new();
    for r in records {
        groups.entry(key_fn(r)).or_default().push(r);
    }
    groups
}

pub struct SameIpSignups;

impl PatternDetector for SameIpSignups {
    fn name(&self) -> &'static str {
        "same_ip_signups"
    }
    fn threshold(&self) -> usize {
        5
    }
    fn window_minutes(&self) -> i64 {
        60
    }

    fn detect(&self, records: &[FingerprintRecord], now: DateTime<Utc>) -> Vec<Anomaly> {
        let windowed = self.window_records(records, now);
        let signups: Vec<&FingerprintRecord> = windowed
            .into_iter()
            .filter(|r| r.event_type == EventType::Signup)
            .collect();
        let groups = group_by(&signups, |r| r.ip.clone());

        groups
            .into_iter()
            .filter(|(_, rs)| rs.len() > self.threshold())
            .map(|(ip, rs)| {
                let users: BTreeSet<String> = rs.iter().map(|r| r.user_id.clone()).collect();
                let risk_score = (rs.len() as f64 / self.threshold() as f64) * 50.0;
                make_anomaly(
                    self.name(),
                    Severity::High,
                    users,
                    serde_json::json!({"ip": ip, "signup_count": rs.len()}),
                    risk_score,
                    now,
                )
            })
            .collect()
    }
}

pub struct SameDeviceSignups;

impl PatternDetector for SameDeviceSignups {
    fn name(&self) -> &'static str {
        "same_device_signups"
    }
    fn threshold(&self) -> usize {
        3
    }
    fn window_minutes(&self) -> i64 {
        60
    }

    fn detect(&self, records: &[FingerprintRecord], now: DateTime<Utc>) -> Vec<Anomaly> {
        let windowed = self.window_records(records, now);
        let signups: Vec<&FingerprintRecord> = windowed
            .into_iter()
            .filter(|r| r.event_type == EventType::Signup)
            .collect();
        let groups = group_by(&signups, |r| r.device_hash.clone());

        groups
            .into_iter()
            .filter(|(_, rs)| rs.len() > self.threshold())
            .map(|(device_hash, rs)| {
                let users: BTreeSet<String> = rs.iter().map(|r| r.user_id.clone()).collect();
                let risk_score = (rs.len() as f64 / self.threshold() as f64) * 60.0;
                make_anomaly(
                    self.name(),
                    Severity::High,
                    users,
                    serde_json::json!({"device_hash": device_hash, "signup_count": rs.len()}),
                    risk_score,
                    now,
                )
            })
            .collect()
    }
}

/// Rapid per-user action velocity: wallet connections or NFT listings.
pub struct RapidAction {
    event_type: EventType,
    pattern_name: &'static str,
    threshold: usize,
}

impl RapidAction {
    pub fn wallet_connections() -> Self {
        Self {
            event_type: EventType::WalletConnection,
            pattern_name: "rapid_wallet_connections",
            threshold: 10,
        }
    }

    pub fn nft_listings() -> Self {
        Self {
            event_type: EventType::NftListing,
            pattern_name: "rapid_nft_listings",
            threshold: 15,
        }
    }
}

impl PatternDetector for RapidAction {
    fn name(&self) -> &'static str {
        self.pattern_name
    }
    fn threshold(&self) -> usize {
        self.threshold
    }
    fn window_minutes(&self) -> i64 {
        5
    }

    fn detect(&self, records: &[FingerprintRecord], now: DateTime<Utc>) -> Vec<Anomaly> {
        let windowed = self.window_records(records, now);
        let actions: Vec<&FingerprintRecord> = windowed
            .into_iter()
            .filter(|r| r.event_type == self.event_type)
            .collect();
        let groups = group_by(&actions, |r| r.user_id.clone());

        groups
            .into_iter()
            .filter(|(_, rs)| rs.len() > self.threshold())
            .map(|(user_id, rs)| {
                let risk_score = (rs.len() as f64 / self.threshold() as f64) * 40.0;
                make_anomaly(
                    self.name(),
                    Severity::Med,
                    BTreeSet::from([user_id.clone()]),
                    serde_json::json!({"user_id": user_id, "action_count": rs.len()}),
                    risk_score,
                    now,
                )
            })
            .collect()
    }
}

pub struct ReferralSpam;

impl PatternDetector for ReferralSpam {
    fn name(&self) -> &'static str {
        "referral_spam"
    }
    fn threshold(&self) -> usize {
        20
    }
    fn window_minutes(&self) -> i64 {
        60
    }

    fn detect(&self, records: &[FingerprintRecord], now: DateTime<Utc>) -> Vec<Anomaly> {
        let windowed = self.window_records(records, now);
        let referrals: Vec<&FingerprintRecord> = windowed
            .into_iter()
            .filter(|r| r.event_type == EventType::Referral)
            .collect();
        let groups = group_by(&referrals, |r| r.user_id.clone());

        groups
            .into_iter()
            .filter(|(_, rs)| rs.len() > self.threshold())
            .map(|(user_id, rs)| {
                let unique_sources: BTreeSet<String> = rs
                    .iter()
                    .map(|r| {
                        r.browser_details
                            .as_ref()
                            .and_then(|v| v.get("referrer_url"))
                            .and_then(|v| v.as_str())
                            .unwrap_or("unknown")
                            .to_string()
                    })
                    .collect();
                let diversity = unique_sources.len() as f64 / rs.len() as f64;
                let severity = if diversity < 0.3 { Severity::High } else { Severity::Med };
                let multiplier = if diversity < 0.3 { 60.0 } else { 35.0 };
                let risk_score = (rs.len() as f64 / self.threshold() as f64) * multiplier;
                make_anomaly(
                    self.name(),
                    severity,
                    BTreeSet::from([user_id.clone()]),
                    serde_json::json!({
                        "user_id": user_id,
                        "referral_count": rs.len(),
                        "unique_sources": unique_sources.len(),
                        "diversity_score": diversity,
                    }),
                    risk_score,
                    now,
                )
            })
            .collect()
    }
}

pub struct DuplicateMemes;

impl PatternDetector for DuplicateMemes {
    fn name(&self) -> &'static str {
        "duplicate_memes"
    }
    fn threshold(&self) -> usize {
        3
    }
    fn window_minutes(&self) -> i64 {
        1440
    }

    fn detect(&self, records: &[FingerprintRecord], now: DateTime<Utc>) -> Vec<Anomaly> {
        let windowed = self.window_records(records, now);
        let uploads: Vec<&FingerprintRecord> = windowed
            .into_iter()
            .filter(|r| r.event_type == EventType::MemeUpload)
            .collect();

        let mut by_user_and_hash: HashMap<(String, String), Vec<&FingerprintRecord>> = HashMap::new();
        for upload in &uploads {
            let meme_hash = upload
                .browser_details
                .as_ref()
                .and_then(|v| v.get("meme_hash"))
                .and_then(|v| v.as_str());
            if let Some(hash) = meme_hash {
                by_user_and_hash
                    .entry((upload.user_id.clone(), hash.to_string()))
                    .or_default()
                    .push(upload);
            }
        }

        by_user_and_hash
            .into_iter()
            .filter(|(_, rs)| rs.len() > self.threshold())
            .map(|((user_id, meme_hash), rs)| {
                let risk_score = (rs.len() as f64 / self.threshold() as f64) * 25.0;
                make_anomaly(
                    self.name(),
                    Severity::Low,
                    BTreeSet::from([user_id.clone()]),
                    serde_json::json!({
                        "user_id": user_id,
                        "meme_hash": meme_hash,
                        "upload_count": rs.len(),
                    }),
                    risk_score,
                    now,
                )
            })
            .collect()
    }
}

pub struct LoginVelocityPerIp;

impl PatternDetector for LoginVelocityPerIp {
    fn name(&self) -> &'static str {
        "login_velocity_per_ip"
    }
    fn threshold(&self) -> usize {
        10
    }
    fn window_minutes(&self) -> i64 {
        5
    }

    fn detect(&self, records: &[FingerprintRecord], now: DateTime<Utc>) -> Vec<Anomaly> {
        let windowed = self.window_records(records, now);
        let logins: Vec<&FingerprintRecord> = windowed
            .into_iter()
            .filter(|r| r.event_type == EventType::Login)
            .collect();
        let groups = group_by(&logins, |r| r.ip.clone());

        groups
            .into_iter()
            .filter(|(_, rs)| rs.len() > self.threshold())
            .map(|(ip, rs)| {
                let users: BTreeSet<String> = rs.iter().map(|r| r.user_id.clone()).collect();
                let risk_score = (rs.len() as f64 / self.threshold() as f64) * 70.0;
                make_anomaly(
                    self.name(),
                    Severity::High,
                    users,
                    serde_json::json!({"ip": ip, "login_count": rs.len()}),
                    risk_score,
                    now,
                )
            })
            .collect()
    }
}

/// The full required pattern bank, in the order evaluated.
pub fn default_bank() -> Vec<Box<dyn PatternDetector>> {
    vec![
        Box::new(SameIpSignups),
        Box::new(SameDeviceSignups),
        Box::new(RapidAction::wallet_connections()),
        Box::new(RapidAction::nft_listings()),
        Box::new(ReferralSpam),
        Box::new(DuplicateMemes),
        Box::new(LoginVelocityPerIp),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signup(ip: &str, device_hash: &str, user_id: &str, minutes_ago: i64, now: DateTime<Utc>) -> FingerprintRecord {
        FingerprintRecord {
            user_id: user_id.to_string(),
            event_type: EventType::Signup,
            ip: ip.to_string(),
            user_agent: "ua".to_string(),
            device_hash: device_hash.to_string(),
            timestamp: now - Duration::minutes(minutes_ago),
            confidence: 1.0,
            geo: None,
            browser_details: None,
        }
    }

    #[test]
    fn test_same_ip_signups_triggers_above_threshold() {
        let now = Utc::now();
        let records: Vec<_> = (0..6)
            .map(|i| signup("1.2.3.4", &format!("d{i}"), &format!("u{i}"), 1, now))
            .collect();
        let anomalies = SameIpSignups.detect(&records, now);
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].severity, Severity::High);
        assert_eq!(anomalies[0].affected_users.len(), 6);
    }

    #[test]
    fn test_same_ip_signups_exactly_at_threshold_does_not_trigger() {
        let now = Utc::now();
        let records: Vec<_> = (0..5)
            .map(|i| signup("1.2.3.4", &format!("d{i}"), &format!("u{i}"), 1, now))
            .collect();
        assert!(SameIpSignups.detect(&records, now).is_empty());
    }

    #[test]
    fn test_window_boundary_is_strictly_excluded() {
        let now = Utc::now();
        let mut records: Vec<_> = (0..6)
            .map(|i| signup("1.2.3.4", &format!("d{i}"), &format!("u{i}"), 1, now))
            .collect();
        // Exactly on the lower boundary — excluded per detection-correctness rule.
        records.push(signup("1.2.3.4", "d_old", "u_old", 60, now));
        let anomalies = SameIpSignups.detect(&records, now);
        assert_eq!(anomalies[0].affected_users.len(), 6);
    }

    #[test]
    fn test_referral_spam_severity_depends_on_diversity() {
        let now = Utc::now();
        let mut records = Vec::new();
        for i in 0..21 {
            records.push(FingerprintRecord {
                user_id: "u1".to_string(),
                event_type: EventType::Referral,
                ip: "1.2.3.4".to_string(),
                user_agent: "ua".to_string(),
                device_hash: "d1".to_string(),
                timestamp: now - Duration::minutes(1),
                confidence: 1.0,
                geo: None,
                browser_details: Some(serde_json::json!({"referrer_url": "same"})),
            });
            let _ = i;
        }
        let anomalies = ReferralSpam.detect(&records, now);
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].severity, Severity::High);
    }
}
