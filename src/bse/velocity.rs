// Step 7: velocity classification — events/5min, events/hour, and
// unique-IP/hour, mirrored by MAF's own velocity metric (§4.2).

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};

use crate::model::{FingerprintRecord, VelocityScore};

pub fn classify(recent: &[FingerprintRecord], now: DateTime<Utc>) -> VelocityScore {
    let five_min_ago = now - Duration::minutes(5);
    let hour_ago = now - Duration::hours(1);

    let events_5min = recent.iter().filter(|r| r.timestamp > five_min_ago).count();
    let hourly: Vec<&FingerprintRecord> =
        recent.iter().filter(|r| r.timestamp > hour_ago).collect();
    let events_hour = hourly.len();
    let unique_ips_hour: HashSet<&str> = hourly.iter().map(|r| r.ip.as_str()).collect();

    if events_5min >= 10 || events_hour >= 60 || unique_ips_hour.len() >= 5 {
        VelocityScore::High
    } else if events_5min >= 5 || events_hour >= 30 || unique_ips_hour.len() >= 3 {
        VelocityScore::Medium
    } else {
        VelocityScore::Low
    }
}

pub fn score(velocity: VelocityScore) -> (f64, Vec<&'static str>) {
    match velocity {
        VelocityScore::High => (-15.0, vec!["high_velocity"]),
        VelocityScore::Medium => (-5.0, vec!["elevated_velocity"]),
        VelocityScore::Low => (0.0, vec![]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EventType;

    fn record(minutes_ago: i64, ip: &str, now: DateTime<Utc>) -> FingerprintRecord {
        FingerprintRecord {
            user_id: "u1".into(),
            event_type: EventType::Click,
            ip: ip.into(),
            user_agent: "ua".into(),
            device_hash: "h".into(),
            timestamp: now - Duration::minutes(minutes_ago),
            confidence: 1.0,
            geo: None,
            browser_details: None,
        }
    }

    #[test]
    fn test_sparse_activity_is_low() {
        let now = Utc::now();
        let recent = vec![record(1, "1.1.1.1", now)];
        assert_eq!(classify(&recent, now), VelocityScore::Low);
    }

    #[test]
    fn test_burst_in_five_minutes_is_high() {
        let now = Utc::now();
        let recent: Vec<_> = (0..10).map(|i| record(i, "1.1.1.1", now)).collect();
        assert_eq!(classify(&recent, now), VelocityScore::High);
    }

    #[test]
    fn test_many_unique_ips_in_hour_is_high() {
        let now = Utc::now();
        let recent: Vec<_> = (0..5)
            .map(|i| record(30, &format!("1.1.1.{i}"), now))
            .collect();
        assert_eq!(classify(&recent, now), VelocityScore::High);
    }

    #[test]
    fn test_score_mapping() {
        assert_eq!(score(VelocityScore::High), (-15.0, vec!["high_velocity"]));
        assert_eq!(score(VelocityScore::Low), (0.0, vec![]));
    }
}
