// Step 5: behavioral pattern detection over the recent-activity window.
// Mirrors the teacher's gate+multiplier shape (`scoring::behavioral`) but
// applied to identical-event-type bursts rather than reply/engagement
// signals.

use chrono::{DateTime, Duration, Utc};

use crate::model::{EventType, FingerprintRecord};

const BOT_LIKE_VELOCITY_WINDOW_MINUTES: i64 = 5;
const BOT_LIKE_VELOCITY_THRESHOLD: usize = 5;

pub fn score(
    recent: &[FingerprintRecord],
    event_type: EventType,
    now: DateTime<Utc>,
) -> (f64, Vec<&'static str>) {
    let window_start = now - Duration::minutes(BOT_LIKE_VELOCITY_WINDOW_MINUTES);
    let same_type_count = recent
        .iter()
        .filter(|r| r.event_type == event_type && r.timestamp > window_start)
        .count();

    if same_type_count >= BOT_LIKE_VELOCITY_THRESHOLD {
        (-15.0, vec!["bot_like_velocity"])
    } else {
        (0.0, vec![])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(event_type: EventType, minutes_ago: i64, now: DateTime<Utc>) -> FingerprintRecord {
        FingerprintRecord {
            user_id: "u1".into(),
            event_type,
            ip: "1.2.3.4".into(),
            user_agent: "ua".into(),
            device_hash: "h".into(),
            timestamp: now - Duration::minutes(minutes_ago),
            confidence: 1.0,
            geo: None,
            browser_details: None,
        }
    }

    #[test]
    fn test_burst_of_identical_events_flags_bot_like_velocity() {
        let now = Utc::now();
        let recent: Vec<_> = (0..5).map(|i| record(EventType::Click, i, now)).collect();
        assert_eq!(
            score(&recent, EventType::Click, now),
            (-15.0, vec!["bot_like_velocity"])
        );
    }

    #[test]
    fn test_events_outside_window_dont_count() {
        let now = Utc::now();
        let recent: Vec<_> = (0..5).map(|i| record(EventType::Click, 10 + i, now)).collect();
        assert_eq!(score(&recent, EventType::Click, now), (0.0, vec![]));
    }

    #[test]
    fn test_mixed_event_types_dont_trigger() {
        let now = Utc::now();
        let recent = vec![
            record(EventType::Click, 1, now),
            record(EventType::Login, 1, now),
            record(EventType::PageView, 1, now),
        ];
        assert_eq!(score(&recent, EventType::Click, now), (0.0, vec![]));
    }
}
