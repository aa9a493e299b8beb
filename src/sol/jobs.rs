// The three scheduled jobs (§4.3). Each is a free async function over
// `&dyn Database` so the scheduler loop in `sol::mod` can dispatch by
// name and so tests can run a job against an in-memory sqlite db.

use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use rand::seq::IndexedRandom;
use rand::Rng;
use tracing::{info, warn};

use crate::bse::{self, UserContext};
use crate::db::Database;
use crate::model::{
    Alert, AnomalyStatus, Challenge, Event, EventType, JobLog, JobStatus, LeaderboardEntry, Severity, User,
};
use crate::retry::{with_backoff, BackoffConfig};

const LEADERBOARD_SIZE: usize = 100;
const ARCHIVE_RETENTION_WEEKS: i64 = 4;

/// `daily_bse_recalculation` (00:01 UTC). Recomputes every user's score
/// against a synthetic heartbeat event carrying no metadata — there is
/// no inbound Event to recalculate against, only the passage of time, so
/// BSE's account-age rule is the only one that can move the score here.
pub async fn daily_bse_recalculation(db: &dyn Database, backoff: BackoffConfig) -> Result<JobLog> {
    let start = Utc::now();
    let job_name = "daily_bse_recalculation";

    let users = with_backoff(backoff, || db.get_all_users()).await?;
    let total = users.len();
    let mut updated = 0u64;
    let mut failed = 0u64;

    for user in &users {
        match recalculate_one(db, user, start, backoff).await {
            Ok(()) => updated += 1,
            Err(err) => {
                failed += 1;
                warn!(user_id = %user.id, error = %err, "daily recalculation failed for user");
            }
        }
    }

    let leaderboard_updated = rebuild_leaderboard(db, backoff).await.is_ok();

    let status = if total > 0 && failed as f64 > total as f64 * 0.1 {
        JobStatus::Failed
    } else {
        JobStatus::Success
    };

    let log = JobLog {
        job_name: job_name.to_string(),
        timestamp: start,
        status,
        error: if status == JobStatus::Failed {
            Some(format!("{failed}/{total} users failed to recalculate"))
        } else {
            None
        },
        metadata: serde_json::json!({
            "users_updated": updated,
            "users_failed": failed,
            "leaderboard_updated": leaderboard_updated,
        }),
    };
    with_backoff(backoff, || db.insert_job_log(&log)).await?;

    if status == JobStatus::Failed {
        alert_job_failure(db, backoff, job_name, &log).await?;
    }

    info!(job_name, updated, failed, "daily BSE recalculation finished");
    Ok(log)
}

async fn recalculate_one(db: &dyn Database, user: &User, now: DateTime<Utc>, backoff: BackoffConfig) -> Result<()> {
    let account_age_days = (now - user.created_at).num_days().max(0);
    let recent_activity = with_backoff(backoff, || {
        db.get_user_fingerprints_since(&user.id, now - Duration::hours(24), 200)
    })
    .await?;

    let ctx = UserContext {
        account_age_days,
        current_score: user.behavior_score,
        is_verified: user.is_verified,
        recent_activity,
    };
    let heartbeat = Event {
        user_id: user.id.clone(),
        event_type: EventType::Login,
        timestamp: now,
        metadata: serde_json::json!({}),
        source_ip: None,
        user_agent: None,
        device_fingerprint_id: None,
    };
    let outcome = bse::compute(&heartbeat, &ctx);

    let mut updated = user.clone();
    updated.behavior_score = outcome.score;
    updated.last_updated = now;
    with_backoff(backoff, || db.upsert_user(&updated)).await?;
    Ok(())
}

async fn rebuild_leaderboard(db: &dyn Database, backoff: BackoffConfig) -> Result<()> {
    let now = Utc::now();
    let mut users = with_backoff(backoff, || db.get_all_users()).await?;
    users.sort_by(|a, b| b.behavior_score.total_cmp(&a.behavior_score));
    users.truncate(LEADERBOARD_SIZE);

    let previous: HashMap<String, u32> = with_backoff(backoff, || db.get_leaderboard())
        .await?
        .into_iter()
        .map(|entry| (entry.user_id, entry.position))
        .collect();

    let entries: Vec<LeaderboardEntry> = users
        .into_iter()
        .enumerate()
        .map(|(idx, user)| {
            let position = (idx + 1) as u32;
            let previous_position = previous.get(&user.id).copied();
            LeaderboardEntry {
                user_id: user.id,
                position,
                behavior_score: user.behavior_score,
                previous_position,
                position_change: previous_position.map(|prev| prev as i32 - position as i32),
                created_at: now,
            }
        })
        .collect();

    with_backoff(backoff, || db.replace_leaderboard(&entries)).await?;
    with_backoff(backoff, || db.archive_leaderboard_snapshot(&entries)).await?;
    with_backoff(backoff, || db.prune_leaderboard_archive(now - Duration::weeks(ARCHIVE_RETENTION_WEEKS))).await?;
    Ok(())
}

struct ChallengeTemplate {
    challenge_type: &'static str,
    reward_points: u32,
}

const TEMPLATES: &[ChallengeTemplate] = &[
    ChallengeTemplate { challenge_type: "theme", reward_points: 50 },
    ChallengeTemplate { challenge_type: "format", reward_points: 30 },
    ChallengeTemplate { challenge_type: "viral", reward_points: 100 },
    ChallengeTemplate { challenge_type: "engagement", reward_points: 75 },
    ChallengeTemplate { challenge_type: "daily", reward_points: 80 },
];

const THEMES: &[&str] = &[
    "technology", "gaming", "work from home", "coffee", "weekends", "coding", "AI", "social media",
];
const FORMATS: &[&str] = &[
    "drake pointing", "distracted boyfriend", "two buttons", "expanding brain", "woman yelling at cat",
];

fn describe_challenge(template: &ChallengeTemplate, rng: &mut impl Rng) -> String {
    match template.challenge_type {
        "theme" => format!("Create memes about {}", THEMES.choose(rng).copied().unwrap_or("memes")),
        "format" => format!(
            "Create {} memes using {} format",
            rng.random_range(2..=5),
            FORMATS.choose(rng).copied().unwrap_or("classic")
        ),
        "viral" => format!("Get {} likes on a single meme", rng.random_range(50..=200)),
        "engagement" => format!("Get {} comments on your memes this week", rng.random_range(20..=100)),
        "daily" => "Post at least one meme every day this week".to_string(),
        other => format!("Complete the {other} challenge"),
    }
}

/// `weekly_challenges_and_reset` (Monday 00:10 UTC).
pub async fn weekly_challenges_and_reset(db: &dyn Database, backoff: BackoffConfig) -> Result<JobLog> {
    let start = Utc::now();
    let job_name = "weekly_challenges_and_reset";
    let mut rng = rand::rng();

    let num_challenges = rng.random_range(3..=5);
    let mut created = 0u64;
    for _ in 0..num_challenges {
        let template = TEMPLATES.choose(&mut rng).expect("template list is non-empty");
        let description = describe_challenge(template, &mut rng);
        let challenge = Challenge {
            id: format!("challenge_{}_{:04}", start.format("%Y%m%d"), rng.random_range(1000..=9999)),
            challenge_type: template.challenge_type.to_string(),
            description,
            start_date: start,
            end_date: start + Duration::days(7),
            reward_points: template.reward_points,
            active: true,
        };
        with_backoff(backoff, || db.insert_challenge(&challenge)).await?;
        created += 1;
    }

    let leaderboard = with_backoff(backoff, || db.get_leaderboard()).await?;
    with_backoff(backoff, || db.archive_leaderboard_snapshot(&leaderboard)).await?;
    let reset_count = with_backoff(backoff, || db.reset_weekly_scores()).await?;

    let log = JobLog {
        job_name: job_name.to_string(),
        timestamp: start,
        status: JobStatus::Success,
        error: None,
        metadata: serde_json::json!({
            "challenges_created": created,
            "users_reset": reset_count,
        }),
    };
    with_backoff(backoff, || db.insert_job_log(&log)).await?;

    info!(job_name, created, reset_count, "weekly challenges and reset finished");
    Ok(log)
}

/// `hourly_flagged_user_detection` (top of hour).
pub async fn hourly_flagged_user_detection(db: &dyn Database, backoff: BackoffConfig) -> Result<JobLog> {
    let start = Utc::now();
    let job_name = "hourly_flagged_user_detection";
    let since = start - Duration::hours(1);

    let flags = with_backoff(backoff, || db.get_all_risk_flags_since(since)).await?;
    let anomalies = with_backoff(backoff, || db.get_anomalies_since(since)).await?;

    let mut per_user: HashMap<String, u32> = HashMap::new();
    for flag in &flags {
        *per_user.entry(flag.user_id.clone()).or_insert(0) += 1;
    }
    for anomaly in &anomalies {
        for user_id in &anomaly.affected_users {
            *per_user.entry(user_id.clone()).or_insert(0) += 1;
        }
    }

    let mut high_risk_users = Vec::new();
    let mut medium_risk_users = Vec::new();
    for (user_id, count) in &per_user {
        if *count >= 5 {
            high_risk_users.push(user_id.clone());
        } else if *count >= 3 {
            medium_risk_users.push(user_id.clone());
        }
    }

    let total_flags = flags.len() + anomalies.len();
    let has_high = !high_risk_users.is_empty();
    let should_alert = has_high || total_flags >= 10;

    if should_alert {
        let priority = if has_high { Severity::High } else { Severity::Med };
        let alert = Alert {
            alert_type: "flagged_users_detected".to_string(),
            priority,
            summary: format!(
                "{} high-risk and {} medium-risk users in the last hour ({} total flags/anomalies)",
                high_risk_users.len(),
                medium_risk_users.len(),
                total_flags
            ),
            details: serde_json::json!({
                "high_risk_users": high_risk_users,
                "medium_risk_users": medium_risk_users,
                "total_flags": total_flags,
            }),
            status: AnomalyStatus::Open,
            created_at: start,
        };
        with_backoff(backoff, || db.insert_alert(&alert)).await?;
    }

    let log = JobLog {
        job_name: job_name.to_string(),
        timestamp: start,
        status: JobStatus::Success,
        error: None,
        metadata: serde_json::json!({
            "flags_analyzed": total_flags,
            "high_risk_users": high_risk_users.len(),
            "medium_risk_users": medium_risk_users.len(),
            "alert_sent": should_alert,
        }),
    };
    with_backoff(backoff, || db.insert_job_log(&log)).await?;

    info!(job_name, total_flags, alert_sent = should_alert, "hourly flagged-user detection finished");
    Ok(log)
}

async fn alert_job_failure(db: &dyn Database, backoff: BackoffConfig, job_name: &str, log: &JobLog) -> Result<()> {
    let alert = Alert {
        alert_type: "job_failure".to_string(),
        priority: Severity::High,
        summary: format!("{job_name} exceeded its failure threshold"),
        details: log.metadata.clone(),
        status: AnomalyStatus::Open,
        created_at: log.timestamp,
    };
    with_backoff(backoff, || db.insert_alert(&alert)).await
}
