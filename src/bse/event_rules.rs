// Step 4: event-specific scoring, delegated per `event_type`. Thresholds
// and field names are in the same spirit as the frequent-login /
// fake-referral / rapid-click rules of the original scorer, generalized
// to the full event-type set and the richer metadata shape used here.

use serde_json::Value;

use crate::bse::UserContext;
use crate::model::EventType;

pub fn score(event_type: EventType, metadata: &Value, ctx: &UserContext) -> (f64, Vec<&'static str>) {
    match event_type {
        EventType::Login => score_login(metadata),
        EventType::MemeUpload => score_meme_upload(metadata),
        EventType::SocialInteraction => score_social_interaction(metadata),
        EventType::Referral => score_referral(metadata, ctx),
        EventType::FormSubmission => score_form_submission(metadata),
        _ => (0.0, vec![]),
    }
}

fn as_u64(metadata: &Value, key: &str) -> u64 {
    metadata.get(key).and_then(Value::as_u64).unwrap_or(0)
}

fn as_f64(metadata: &Value, key: &str) -> f64 {
    metadata.get(key).and_then(Value::as_f64).unwrap_or(0.0)
}

fn as_bool(metadata: &Value, key: &str) -> bool {
    metadata.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn score_login(metadata: &Value) -> (f64, Vec<&'static str>) {
    if as_u64(metadata, "login_count_today") > 10 {
        (-10.0, vec!["frequent_logins"])
    } else {
        (0.0, vec![])
    }
}

fn score_meme_upload(metadata: &Value) -> (f64, Vec<&'static str>) {
    let mut delta = 0.0;
    let mut flags = Vec::new();
    if as_u64(metadata, "upload_count_today") > 20 {
        delta -= 15.0;
        flags.push("meme_spam");
    }
    if as_bool(metadata, "duplicate_content") {
        delta -= 10.0;
        flags.push("duplicate_meme");
    }
    (delta, flags)
}

fn score_social_interaction(metadata: &Value) -> (f64, Vec<&'static str>) {
    if as_f64(metadata, "interaction_rate_per_min") > 30.0 {
        (-15.0, vec!["rapid_interactions"])
    } else {
        (0.0, vec![])
    }
}

fn score_referral(metadata: &Value, ctx: &UserContext) -> (f64, Vec<&'static str>) {
    let known_abusive_ip = as_bool(metadata, "referrer_ip_known_abusive");
    let referred_inactive = as_bool(metadata, "referred_user_inactive");
    if known_abusive_ip && referred_inactive {
        return (-20.0, vec!["low_quality_referral"]);
    }
    // A brand-new account generating referrals is worth flagging even
    // without the stronger signals above.
    if ctx.account_age_days < 1 && as_u64(metadata, "referral_count_today") > 3 {
        return (-10.0, vec!["new_account_referral_burst"]);
    }
    (0.0, vec![])
}

fn score_form_submission(metadata: &Value) -> (f64, Vec<&'static str>) {
    let mut delta = 0.0;
    let mut flags = Vec::new();
    if as_bool(metadata, "honeypot_triggered") {
        delta -= 30.0;
        flags.push("honeypot_triggered");
    }
    if as_f64(metadata, "submission_rate_per_min") > 10.0 {
        delta -= 10.0;
        flags.push("rapid_form_submission");
    }
    (delta, flags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> UserContext {
        UserContext {
            account_age_days: 100,
            current_score: 100.0,
            is_verified: false,
            recent_activity: vec![],
        }
    }

    #[test]
    fn test_frequent_login_penalty() {
        let metadata = json!({"login_count_today": 11});
        assert_eq!(score(EventType::Login, &metadata, &ctx()), (-10.0, vec!["frequent_logins"]));
    }

    #[test]
    fn test_low_quality_referral_requires_both_signals() {
        let metadata = json!({"referrer_ip_known_abusive": true, "referred_user_inactive": false});
        assert_eq!(score(EventType::Referral, &metadata, &ctx()), (0.0, vec![]));

        let metadata = json!({"referrer_ip_known_abusive": true, "referred_user_inactive": true});
        assert_eq!(
            score(EventType::Referral, &metadata, &ctx()),
            (-20.0, vec!["low_quality_referral"])
        );
    }

    #[test]
    fn test_honeypot_and_rate_stack() {
        let metadata = json!({"honeypot_triggered": true, "submission_rate_per_min": 15.0});
        assert_eq!(
            score(EventType::FormSubmission, &metadata, &ctx()),
            (-40.0, vec!["honeypot_triggered", "rapid_form_submission"])
        );
    }

    #[test]
    fn test_unknown_event_types_are_neutral() {
        assert_eq!(score(EventType::PageView, &json!({}), &ctx()), (0.0, vec![]));
    }
}
