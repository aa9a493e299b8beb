// Step 3: fake-referral penalties. Only applies on `event_type = referral`,
// read from `metadata.fake_referral_analysis`.

use serde_json::Value;

use crate::model::EventType;

pub fn score(event_type: EventType, metadata: &Value) -> (f64, Vec<&'static str>) {
    if event_type != EventType::Referral {
        return (0.0, vec![]);
    }

    let analysis = metadata.get("fake_referral_analysis");
    let is_fake = analysis
        .and_then(|a| a.get("is_fake_referral"))
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if !is_fake {
        return (0.0, vec![]);
    }

    let mut delta = 0.0;
    let mut flags = Vec::new();

    if let Some(signals) = analysis.and_then(|a| a.get("fake_signals")).and_then(Value::as_array) {
        for signal in signals.iter().filter_map(Value::as_str) {
            match signal {
                "same_ip_referral" => {
                    delta -= 35.0;
                    flags.push("fake_referral_same_ip");
                }
                "excessive_ip_referrals" => {
                    delta -= 30.0;
                    flags.push("fake_referral_ip_abuse");
                }
                "inactive_referred_user" => {
                    delta -= 25.0;
                    flags.push("fake_referral_inactive_user");
                }
                "rapid_referrals" => {
                    delta -= 20.0;
                    flags.push("fake_referral_velocity");
                }
                _ => {}
            }
        }
    }

    (delta, flags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_non_referral_events_are_ignored() {
        let metadata = json!({"fake_referral_analysis": {"is_fake_referral": true, "fake_signals": ["same_ip_referral"]}});
        assert_eq!(score(EventType::Login, &metadata), (0.0, vec![]));
    }

    #[test]
    fn test_same_ip_referral_penalty() {
        let metadata = json!({
            "fake_referral_analysis": {
                "is_fake_referral": true,
                "fake_signals": ["same_ip_referral", "rapid_referrals"]
            }
        });
        let (delta, flags) = score(EventType::Referral, &metadata);
        assert_eq!(delta, -55.0);
        assert_eq!(flags, vec!["fake_referral_same_ip", "fake_referral_velocity"]);
    }

    #[test]
    fn test_clean_referral_is_neutral() {
        let metadata = json!({"fake_referral_analysis": {"is_fake_referral": false}});
        assert_eq!(score(EventType::Referral, &metadata), (0.0, vec![]));
    }
}
