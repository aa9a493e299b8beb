// Pre-filters run before payload validation: a cheap bot heuristic and a
// fake-referral heuristic, both from spec.md §4.4. These are coarser and
// faster than BSE/MAF's own bot/referral rules — they exist to reject
// obvious abuse before it's ever persisted.

use chrono::{Duration, Utc};

use crate::db::Database;
use crate::model::EventType;

pub struct BotSignal {
    pub probability: f64,
    pub signals: Vec<&'static str>,
}

/// UA/fingerprint heuristics. `probability > 0.8` or `>= 2` distinct
/// signals triggers a reject.
pub fn detect_bot(user_agent: Option<&str>, has_fingerprint_id: bool) -> BotSignal {
    let mut probability: f64 = 0.0;
    let mut signals = Vec::new();

    let ua = user_agent.unwrap_or("");
    let ua_lower = ua.to_lowercase();
    if ["bot", "crawler", "spider", "scraper"].iter().any(|kw| ua_lower.contains(kw)) {
        probability = probability.max(0.9);
        signals.push("bot_keyword_in_user_agent");
    }
    if ua.is_empty() || ua.len() < 20 {
        probability = probability.max(0.6);
        signals.push("short_or_missing_user_agent");
    }
    if !has_fingerprint_id {
        probability = probability.max(0.4);
        signals.push("missing_fingerprint_id");
    }

    BotSignal { probability, signals }
}

pub fn should_reject_bot(signal: &BotSignal) -> bool {
    signal.probability > 0.8 || signal.signals.len() >= 2
}

/// Same-IP and same-user referral-abuse heuristics, only applicable to
/// `event_type = referral`.
pub async fn detect_fake_referral(
    db: &dyn Database,
    user_id: &str,
    source_ip: Option<&str>,
    now: chrono::DateTime<Utc>,
) -> anyhow::Result<Vec<&'static str>> {
    let mut signals = Vec::new();

    if let Some(ip) = source_ip {
        let since = now - Duration::hours(1);
        let recent = db.get_fingerprints_since(since).await?;
        let same_ip_referrals = recent
            .iter()
            .filter(|r| r.event_type == EventType::Referral && r.ip == ip)
            .count();
        if same_ip_referrals > 3 {
            signals.push("excessive_ip_referrals");
        }
    }

    let today_start = now - Duration::days(1);
    let user_referrals_today = db
        .get_user_fingerprints_since(user_id, today_start, 1000)
        .await
        .map(|records| records.iter().filter(|r| r.event_type == EventType::Referral).count())
        .unwrap_or(0);
    if user_referrals_today > 10 {
        signals.push("excessive_user_referrals");
    }

    Ok(signals)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_agent_is_not_flagged() {
        let signal = detect_bot(Some("Mozilla/5.0 (Windows NT 10.0; Win64; x64)"), true);
        assert!(!should_reject_bot(&signal));
    }

    #[test]
    fn test_bot_keyword_alone_is_rejected() {
        let signal = detect_bot(Some("Mozilla/5.0 compatible; crawler-bot/1.0 (+http://example.com)"), true);
        assert!(signal.probability > 0.8);
        assert!(should_reject_bot(&signal));
    }

    #[test]
    fn test_two_weak_signals_are_rejected() {
        let signal = detect_bot(Some("short"), false);
        assert!(signal.signals.len() >= 2);
        assert!(should_reject_bot(&signal));
    }

    #[test]
    fn test_single_weak_signal_is_not_rejected() {
        let signal = detect_bot(Some("Mozilla/5.0 full length legit browser UA string"), false);
        assert_eq!(signal.signals.len(), 1);
        assert!(!should_reject_bot(&signal));
    }
}
