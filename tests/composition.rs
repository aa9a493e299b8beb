// Composition tests — verifying that pure functions chain together
// correctly across module boundaries.
//
// These tests exercise the data flow:
//   BSE (score + flags) -> MAF (velocity + flag color + assessment) -> AGK (access decision)
// without any network calls, database access, or filesystem side effects.

use chrono::{Duration, Utc};
use sentrygate::agk;
use sentrygate::bse::{self, UserContext};
use sentrygate::maf;
use sentrygate::model::{
    Event, EventType, FinalRiskAssessment, FingerprintRecord, FlagColor, RiskLevel, User,
    VelocityScore,
};

fn fingerprint_at(user_id: &str, seconds_ago: i64, ip: &str) -> FingerprintRecord {
    FingerprintRecord {
        user_id: user_id.to_string(),
        event_type: EventType::Login,
        ip: ip.to_string(),
        user_agent: "chrome".to_string(),
        device_hash: "devhash1".to_string(),
        timestamp: Utc::now() - Duration::seconds(seconds_ago),
        confidence: 0.8,
        geo: None,
        browser_details: None,
    }
}

// ============================================================
// Chain: BSE -> MAF flag color -> final risk assessment
// ============================================================

#[test]
fn clean_returning_user_chains_to_very_low_assessment() {
    let event = Event {
        user_id: "u1".to_string(),
        event_type: EventType::Login,
        timestamp: Utc::now(),
        metadata: serde_json::json!({}),
        source_ip: Some("1.2.3.4".to_string()),
        user_agent: Some("chrome".to_string()),
        device_fingerprint_id: None,
    };
    let ctx = UserContext {
        account_age_days: 400,
        current_score: 100.0,
        is_verified: true,
        recent_activity: vec![],
    };

    let outcome = bse::compute(&event, &ctx);
    assert_eq!(outcome.risk_level, RiskLevel::HighlyTrusted);

    let velocity = maf::classify_velocity(&ctx.recent_activity, Utc::now());
    let flag_color = maf::determine_flag_color(Some(outcome.score), false, false, velocity);
    assert_eq!(flag_color, FlagColor::Green);

    let assessment = maf::final_risk_assessment(outcome.risk_level, flag_color);
    assert_eq!(assessment, FinalRiskAssessment::VeryLow);
}

#[test]
fn brand_new_account_with_login_burst_chains_to_non_trivial_assessment() {
    // A dozen logins from the same user in the last five minutes: BSE's
    // new-account penalty plus MAF's high-velocity signal should combine
    // into something worse than a clean returning user gets.
    let burst: Vec<FingerprintRecord> = (0..12).map(|i| fingerprint_at("u2", i * 5, "9.9.9.9")).collect();

    let event = Event {
        user_id: "u2".to_string(),
        event_type: EventType::Login,
        timestamp: Utc::now(),
        metadata: serde_json::json!({}),
        source_ip: Some("9.9.9.9".to_string()),
        user_agent: Some("chrome".to_string()),
        device_fingerprint_id: None,
    };
    let ctx = UserContext {
        account_age_days: 0,
        current_score: 100.0,
        is_verified: false,
        recent_activity: burst.clone(),
    };

    let outcome = bse::compute(&event, &ctx);
    assert!(outcome.score < 100.0, "new account + velocity flags should move the score down");

    let velocity = maf::classify_velocity(&burst, Utc::now());
    assert_eq!(velocity, VelocityScore::High);
    let flag_color = maf::determine_flag_color(Some(outcome.score), false, true, velocity);
    let assessment = maf::final_risk_assessment(outcome.risk_level, flag_color);

    assert_ne!(assessment, FinalRiskAssessment::VeryLow);
}

// ============================================================
// Chain: BSE score -> AGK access decision
// ============================================================

#[test]
fn suspicious_score_flows_through_to_agk_denial() {
    let event = Event {
        user_id: "u3".to_string(),
        event_type: EventType::Login,
        timestamp: Utc::now(),
        metadata: serde_json::json!({"honeypot_triggered": true}),
        source_ip: Some("1.2.3.4".to_string()),
        user_agent: Some("chrome".to_string()),
        device_fingerprint_id: None,
    };
    let ctx = UserContext {
        account_age_days: 200,
        current_score: 55.0,
        is_verified: false,
        recent_activity: vec![],
    };

    let outcome = bse::compute(&event, &ctx);

    let user = User {
        id: "u3".to_string(),
        behavior_score: outcome.score,
        created_at: Utc::now() - Duration::days(200),
        is_verified: false,
        weekly_score: 0.0,
        last_updated: Utc::now(),
        metadata: serde_json::json!({}),
    };

    let decision = agk::evaluate(Some(&user), 60.0);
    assert!(!decision.granted);
}

#[test]
fn high_trust_score_flows_through_to_agk_basic_access() {
    let event = Event {
        user_id: "u4".to_string(),
        event_type: EventType::Login,
        timestamp: Utc::now(),
        metadata: serde_json::json!({}),
        source_ip: Some("1.2.3.4".to_string()),
        user_agent: Some("chrome".to_string()),
        device_fingerprint_id: None,
    };
    let ctx = UserContext {
        account_age_days: 400,
        current_score: 100.0,
        is_verified: true,
        recent_activity: vec![],
    };

    let outcome = bse::compute(&event, &ctx);

    let user = User {
        id: "u4".to_string(),
        behavior_score: outcome.score,
        created_at: Utc::now() - Duration::days(400),
        is_verified: true,
        weekly_score: 0.0,
        last_updated: Utc::now(),
        metadata: serde_json::json!({}),
    };

    let decision = agk::evaluate(Some(&user), 60.0);
    assert!(decision.granted);
    assert_eq!(decision.access_level.as_deref(), Some(agk::BASIC_ACCESS));
}
