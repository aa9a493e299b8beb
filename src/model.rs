// Shared data model — Rust types for every entity that flows through the
// pipeline. These are the types that cross module boundaries, the wire,
// and JSON-encoded database columns.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Subject of scoring. Created externally; mutated by BSE/SOL; never
/// deleted by the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub behavior_score: f64,
    pub created_at: DateTime<Utc>,
    pub is_verified: bool,
    pub weekly_score: f64,
    pub last_updated: DateTime<Utc>,
    /// Opaque JSON blob. May carry an embedded passkey under `"passkey"`
    /// and an `access_level` string used by `agk::evaluate`.
    pub metadata: serde_json::Value,
}

impl Default for User {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            behavior_score: 100.0,
            created_at: now,
            is_verified: false,
            weekly_score: 0.0,
            last_updated: now,
            metadata: serde_json::json!({}),
        }
    }
}

/// One behavioral observation. Created on ingress; immutable; consumed
/// by BSE and MAF.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub user_id: String,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub metadata: serde_json::Value,
    pub source_ip: Option<String>,
    pub user_agent: Option<String>,
    pub device_fingerprint_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Login,
    Signup,
    Referral,
    MemeUpload,
    SocialInteraction,
    FormSubmission,
    WalletConnection,
    NftListing,
    Click,
    PageView,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Login => "login",
            EventType::Signup => "signup",
            EventType::Referral => "referral",
            EventType::MemeUpload => "meme_upload",
            EventType::SocialInteraction => "social_interaction",
            EventType::FormSubmission => "form_submission",
            EventType::WalletConnection => "wallet_connection",
            EventType::NftListing => "nft_listing",
            EventType::Click => "click",
            EventType::PageView => "page_view",
        }
    }
}

/// Canonical device/IP sighting, written by the MAF collector and read
/// by pattern detectors. Retained for at least 24h.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FingerprintRecord {
    pub user_id: String,
    pub event_type: EventType,
    pub ip: String,
    pub user_agent: String,
    pub device_hash: String,
    pub timestamp: DateTime<Utc>,
    pub confidence: f64,
    pub geo: Option<String>,
    pub browser_details: Option<serde_json::Value>,
}

/// Per-user risk tag. Append-only; aggregated by SOL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskFlag {
    pub user_id: String,
    pub flag: String,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Med,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Med => "MED",
            Severity::High => "HIGH",
        }
    }
}

/// Cross-user pattern hit produced by a MAF pattern detector. Append-only;
/// drives operator alerts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    pub pattern_name: String,
    pub severity: Severity,
    pub affected_users: BTreeSet<String>,
    pub fingerprint_data: serde_json::Value,
    pub risk_score: f64,
    pub detected_at: DateTime<Utc>,
    pub status: AnomalyStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyStatus {
    Open,
    Acknowledged,
    Resolved,
}

/// Aggregate ingress counters over a trailing window, backing
/// `GET /webhook/stats`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IngressStats {
    pub events_processed: i64,
    pub risk_flags_raised: i64,
    pub anomalies_detected: i64,
    pub bot_detections_total: i64,
    pub bot_detections_rejected: i64,
    pub fake_referral_detections_total: i64,
    pub fake_referral_detections_rejected: i64,
}

/// Materialized leaderboard ranking. Rewritten by the daily SOL job;
/// snapshots older than 4 weeks are pruned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub user_id: String,
    pub position: u32,
    pub behavior_score: f64,
    pub previous_position: Option<u32>,
    pub position_change: Option<i32>,
    pub created_at: DateTime<Utc>,
}

/// Weekly meme task. Inserted weekly; expires after 7 days.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Challenge {
    pub id: String,
    pub challenge_type: String,
    pub description: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub reward_points: u32,
    pub active: bool,
}

/// Scheduled-job audit row. Append-only; consulted for health.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobLog {
    pub job_name: String,
    pub timestamp: DateTime<Utc>,
    pub status: JobStatus,
    pub error: Option<String>,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Success,
    Failed,
    SkippedOverlap,
}

/// Operator-visible incident created by SOL/MAF. Resolved externally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub alert_type: String,
    pub priority: Severity,
    pub summary: String,
    pub details: serde_json::Value,
    pub status: AnomalyStatus,
    pub created_at: DateTime<Utc>,
}

/// Short-lived access token, embedded in `User.metadata`. Format on the
/// wire: `<scope>:<hex-mac>:<unix-ts>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PasskeyScope {
    Wallet,
    Session,
}

impl PasskeyScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            PasskeyScope::Wallet => "wallet",
            PasskeyScope::Session => "session",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "wallet" => Some(PasskeyScope::Wallet),
            "session" => Some(PasskeyScope::Session),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Passkey {
    pub scope: PasskeyScope,
    pub mac: String,
    pub issued_at: DateTime<Utc>,
}

/// BSE's risk-level classification of a computed `behavior_score`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Suspicious,
    Normal,
    HighlyTrusted,
}

impl RiskLevel {
    pub fn from_score(score: f64) -> Self {
        match score {
            s if s < 50.0 => RiskLevel::Suspicious,
            s if s < 80.0 => RiskLevel::Normal,
            _ => RiskLevel::HighlyTrusted,
        }
    }
}

/// MAF's per-event tri-state severity summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FlagColor {
    Green,
    Yellow,
    Red,
}

/// MAF's categorization of per-user event frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VelocityScore {
    Low,
    Medium,
    High,
}

/// Combined BSE x MAF severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinalRiskAssessment {
    VeryLow,
    Low,
    Medium,
    High,
    Critical,
}
