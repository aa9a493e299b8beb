// Database trait — backend-agnostic async interface for all DB operations.
//
// Implementors: SqliteDatabase (wraps rusqlite), PgDatabase (wraps sqlx,
// behind the `postgres` feature). All methods are async so both sync
// (rusqlite via Mutex) and native async (sqlx) backends fit behind a
// single interface.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::model::{
    Alert, Anomaly, Challenge, FingerprintRecord, IngressStats, JobLog, LeaderboardEntry, RiskFlag,
    User,
};

#[async_trait]
pub trait Database: Send + Sync {
    /// Count the number of user-created tables in the database.
    async fn table_count(&self) -> Result<i64>;

    // --- Users ---

    async fn get_user(&self, user_id: &str) -> Result<Option<User>>;

    /// Insert a user if absent, or overwrite it entirely if present.
    /// Callers that need per-user write serialization acquire the
    /// per-user lock before calling this (see `ingress::AppState`).
    async fn upsert_user(&self, user: &User) -> Result<()>;

    // --- Risk flags ---

    async fn insert_risk_flag(&self, flag: &RiskFlag) -> Result<()>;

    /// Risk flags for `user_id` with `timestamp >= since`.
    async fn get_risk_flags_since(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<RiskFlag>>;

    /// All risk flags with `timestamp >= since`, across all users
    /// (used by the hourly flagged-user detection job).
    async fn get_all_risk_flags_since(&self, since: DateTime<Utc>) -> Result<Vec<RiskFlag>>;

    // --- Fingerprint records ---

    async fn insert_fingerprint(&self, record: &FingerprintRecord) -> Result<()>;

    /// Fingerprint records with `timestamp` in `(since, now]` — strict
    /// half-open lower bound per the detection-correctness rule.
    async fn get_fingerprints_since(&self, since: DateTime<Utc>) -> Result<Vec<FingerprintRecord>>;

    /// Fingerprint records for one user with `timestamp in (since, now]`,
    /// most recent first, capped at `limit`. Backs BSE's UserContext
    /// recent-activity window.
    async fn get_user_fingerprints_since(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<FingerprintRecord>>;

    // --- Anomalies ---

    async fn insert_anomaly(&self, anomaly: &Anomaly) -> Result<()>;

    async fn get_anomalies_since(&self, since: DateTime<Utc>) -> Result<Vec<Anomaly>>;

    // --- Leaderboard ---

    /// Replace the materialized leaderboard with a new top-N set.
    async fn replace_leaderboard(&self, entries: &[LeaderboardEntry]) -> Result<()>;

    async fn get_leaderboard(&self) -> Result<Vec<LeaderboardEntry>>;

    /// Archive the current leaderboard as a JSON snapshot.
    async fn archive_leaderboard_snapshot(&self, entries: &[LeaderboardEntry]) -> Result<()>;

    /// Prune archived snapshots older than `older_than`.
    async fn prune_leaderboard_archive(&self, older_than: DateTime<Utc>) -> Result<u64>;

    // --- Challenges ---

    async fn insert_challenge(&self, challenge: &Challenge) -> Result<()>;

    async fn get_active_challenges(&self, now: DateTime<Utc>) -> Result<Vec<Challenge>>;

    async fn deactivate_expired_challenges(&self, now: DateTime<Utc>) -> Result<u64>;

    // --- All users (for SOL's daily recalculation and weekly reset) ---

    async fn get_all_users(&self) -> Result<Vec<User>>;

    async fn reset_weekly_scores(&self) -> Result<u64>;

    // --- Job log ---

    async fn insert_job_log(&self, log: &JobLog) -> Result<()>;

    async fn get_last_job_log(&self, job_name: &str) -> Result<Option<JobLog>>;

    // --- Alerts ---

    async fn insert_alert(&self, alert: &Alert) -> Result<()>;

    // --- Access logs (AGK, best-effort) ---

    async fn insert_access_log(
        &self,
        user_id: &str,
        operation: &str,
        granted: bool,
        reason: Option<&str>,
        access_level: Option<&str>,
    ) -> Result<()>;

    // --- Diagnostic tables (ingress pre-filters) ---

    async fn insert_bot_detection(
        &self,
        user_id: Option<&str>,
        bot_probability: f64,
        signals: &[String],
        rejected: bool,
    ) -> Result<()>;

    async fn insert_fake_referral_detection(
        &self,
        user_id: &str,
        signals: &[String],
        rejected: bool,
    ) -> Result<()>;

    async fn insert_skipped_payload(
        &self,
        reason: &str,
        payload: &serde_json::Value,
    ) -> Result<()>;

    async fn insert_audit_log(
        &self,
        actor: Option<&str>,
        action: &str,
        details: &serde_json::Value,
    ) -> Result<()>;

    /// Aggregate counters for `GET /webhook/stats`, over `timestamp/
    /// detected_at/created_at >= since`.
    async fn get_ingress_stats_since(&self, since: DateTime<Utc>) -> Result<IngressStats>;
}
