// Chart aggregation for `GET /api/dashboard/data` (§6). Five chart
// objects plus a summary block, all derived from the same read methods
// SOL's jobs already use — no separate analytics store.

use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::db::Database;
use crate::model::{RiskLevel, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeRange {
    Hour,
    Day,
    Week,
    Month,
}

impl TimeRange {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.unwrap_or("24h") {
            "1h" => TimeRange::Hour,
            "7d" => TimeRange::Week,
            "30d" => TimeRange::Month,
            _ => TimeRange::Day,
        }
    }

    fn since(self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            TimeRange::Hour => now - Duration::hours(1),
            TimeRange::Day => now - Duration::hours(24),
            TimeRange::Week => now - Duration::days(7),
            TimeRange::Month => now - Duration::days(30),
        }
    }

    /// Width of one bucket for the BSE trend line, scaled to the range
    /// so each range renders roughly 24 points.
    fn bucket_width(self) -> Duration {
        match self {
            TimeRange::Hour => Duration::minutes(2),
            TimeRange::Day => Duration::hours(1),
            TimeRange::Week => Duration::hours(6),
            TimeRange::Month => Duration::days(1),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BseTrendPoint {
    pub bucket_start: DateTime<Utc>,
    pub average_score: f64,
    pub sample_count: u32,
}

#[derive(Debug, Serialize)]
pub struct ScoreZones {
    pub suspicious: u32,
    pub normal: u32,
    pub highly_trusted: u32,
}

#[derive(Debug, Serialize)]
pub struct FlagSlice {
    pub flag: String,
    pub count: u32,
}

#[derive(Debug, Serialize)]
pub struct BotPatternBubble {
    pub pattern_name: String,
    pub severity: Severity,
    pub affected_user_count: u32,
    pub risk_score: f64,
}

#[derive(Debug, Serialize)]
pub struct LeaderboardRow {
    pub position: u32,
    pub user_id: String,
    pub behavior_score: f64,
    pub position_change: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct DashboardSummary {
    pub total_users: u32,
    pub average_score: f64,
    pub open_anomalies: u32,
    pub high_severity_flags_in_range: u32,
    pub time_range: &'static str,
}

#[derive(Debug, Serialize)]
pub struct DashboardData {
    pub bse_trend: Vec<BseTrendPoint>,
    pub score_zones: ScoreZones,
    pub flag_pie: Vec<FlagSlice>,
    pub bot_pattern_bubbles: Vec<BotPatternBubble>,
    pub leaderboard: Vec<LeaderboardRow>,
    pub summary: DashboardSummary,
}

impl TimeRange {
    fn label(self) -> &'static str {
        match self {
            TimeRange::Hour => "1h",
            TimeRange::Day => "24h",
            TimeRange::Week => "7d",
            TimeRange::Month => "30d",
        }
    }
}

pub async fn build_dashboard_data(db: &dyn Database, range: TimeRange) -> Result<DashboardData> {
    let now = Utc::now();
    let since = range.since(now);

    let risk_flags = db.get_all_risk_flags_since(since).await?;
    let anomalies = db.get_anomalies_since(since).await?;
    let users = db.get_all_users().await?;
    let leaderboard = db.get_leaderboard().await?;

    let bse_trend = bucket_trend(&users, since, now, range.bucket_width());
    let score_zones = score_zones(&users);
    let flag_pie = flag_pie(&risk_flags);
    let bot_pattern_bubbles = bot_pattern_bubbles(&anomalies);
    let leaderboard_rows = leaderboard
        .into_iter()
        .map(|entry| LeaderboardRow {
            position: entry.position,
            user_id: entry.user_id,
            behavior_score: entry.behavior_score,
            position_change: entry.position_change,
        })
        .collect();

    let high_severity_flags = risk_flags.iter().filter(|f| f.severity == Severity::High).count() as u32;
    let average_score = if users.is_empty() {
        0.0
    } else {
        users.iter().map(|u| u.behavior_score).sum::<f64>() / users.len() as f64
    };

    Ok(DashboardData {
        bse_trend,
        score_zones,
        flag_pie,
        bot_pattern_bubbles,
        leaderboard: leaderboard_rows,
        summary: DashboardSummary {
            total_users: users.len() as u32,
            average_score,
            open_anomalies: anomalies.iter().filter(|a| a.status == crate::model::AnomalyStatus::Open).count() as u32,
            high_severity_flags_in_range: high_severity_flags,
            time_range: range.label(),
        },
    })
}

pub async fn build_summary(db: &dyn Database, range: TimeRange) -> Result<DashboardSummary> {
    let now = Utc::now();
    let since = range.since(now);
    let risk_flags = db.get_all_risk_flags_since(since).await?;
    let anomalies = db.get_anomalies_since(since).await?;
    let users = db.get_all_users().await?;

    let average_score = if users.is_empty() {
        0.0
    } else {
        users.iter().map(|u| u.behavior_score).sum::<f64>() / users.len() as f64
    };

    Ok(DashboardSummary {
        total_users: users.len() as u32,
        average_score,
        open_anomalies: anomalies.iter().filter(|a| a.status == crate::model::AnomalyStatus::Open).count() as u32,
        high_severity_flags_in_range: risk_flags.iter().filter(|f| f.severity == Severity::High).count() as u32,
        time_range: range.label(),
    })
}

fn bucket_trend(
    users: &[crate::model::User],
    since: DateTime<Utc>,
    now: DateTime<Utc>,
    width: Duration,
) -> Vec<BseTrendPoint> {
    // `users` carries only each user's current score, not a score history;
    // every user whose `last_updated` falls in a bucket contributes their
    // current score to that bucket's average. This is the coarsest trend
    // a schema without a score-history table can support.
    let mut buckets: Vec<(DateTime<Utc>, Vec<f64>)> = Vec::new();
    let mut cursor = since;
    while cursor < now {
        buckets.push((cursor, Vec::new()));
        cursor += width;
    }

    for user in users {
        if user.last_updated < since || user.last_updated > now {
            continue;
        }
        if let Some(bucket) = buckets.iter_mut().rev().find(|(start, _)| user.last_updated >= *start) {
            bucket.1.push(user.behavior_score);
        }
    }

    buckets
        .into_iter()
        .map(|(bucket_start, scores)| {
            let sample_count = scores.len() as u32;
            let average_score = if scores.is_empty() {
                0.0
            } else {
                scores.iter().sum::<f64>() / scores.len() as f64
            };
            BseTrendPoint { bucket_start, average_score, sample_count }
        })
        .collect()
}

fn score_zones(users: &[crate::model::User]) -> ScoreZones {
    let mut zones = ScoreZones { suspicious: 0, normal: 0, highly_trusted: 0 };
    for user in users {
        match RiskLevel::from_score(user.behavior_score) {
            RiskLevel::Suspicious => zones.suspicious += 1,
            RiskLevel::Normal => zones.normal += 1,
            RiskLevel::HighlyTrusted => zones.highly_trusted += 1,
        }
    }
    zones
}

fn flag_pie(flags: &[crate::model::RiskFlag]) -> Vec<FlagSlice> {
    let mut counts: HashMap<String, u32> = HashMap::new();
    for flag in flags {
        *counts.entry(flag.flag.clone()).or_insert(0) += 1;
    }
    let mut slices: Vec<FlagSlice> = counts.into_iter().map(|(flag, count)| FlagSlice { flag, count }).collect();
    slices.sort_by(|a, b| b.count.cmp(&a.count));
    slices
}

fn bot_pattern_bubbles(anomalies: &[crate::model::Anomaly]) -> Vec<BotPatternBubble> {
    let mut by_pattern: HashMap<String, (Severity, u32, f64)> = HashMap::new();
    for anomaly in anomalies {
        let entry = by_pattern.entry(anomaly.pattern_name.clone()).or_insert((anomaly.severity, 0, 0.0));
        entry.0 = entry.0.max(anomaly.severity);
        entry.1 += anomaly.affected_users.len() as u32;
        entry.2 = entry.2.max(anomaly.risk_score);
    }
    let mut bubbles: Vec<BotPatternBubble> = by_pattern
        .into_iter()
        .map(|(pattern_name, (severity, affected_user_count, risk_score))| BotPatternBubble {
            pattern_name,
            severity,
            affected_user_count,
            risk_score,
        })
        .collect();
    bubbles.sort_by(|a, b| b.risk_score.partial_cmp(&a.risk_score).unwrap_or(std::cmp::Ordering::Equal));
    bubbles
}
