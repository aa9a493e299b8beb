// PgDatabase — PostgreSQL backend implementing the Database trait.
//
// Uses sqlx PgPool for native async queries. All queries use runtime
// parameter binding (not compile-time macros) to avoid requiring
// DATABASE_URL at compile time.
//
// Key differences from SQLite:
// - TIMESTAMPTZ instead of TEXT for timestamps
// - JSONB instead of TEXT for structured data
// - $1/$2 parameter syntax (handled by sqlx)
// - GENERATED ALWAYS AS IDENTITY for auto-increment

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx_core::pool::Pool;
use sqlx_core::row::Row;
use sqlx_postgres::Postgres;

use crate::model::{
    Alert, Anomaly, AnomalyStatus, Challenge, FingerprintRecord, IngressStats, JobLog, JobStatus,
    LeaderboardEntry, RiskFlag, Severity, User,
};

use super::traits::Database;

/// Type alias for the PostgreSQL connection pool.
pub type PgPool = Pool<Postgres>;

pub struct PgDatabase {
    pool: PgPool,
}

fn severity_str(s: Severity) -> &'static str {
    s.as_str()
}

fn parse_severity(s: &str) -> Severity {
    match s {
        "LOW" => Severity::Low,
        "HIGH" => Severity::High,
        _ => Severity::Med,
    }
}

fn anomaly_status_str(s: AnomalyStatus) -> &'static str {
    match s {
        AnomalyStatus::Open => "open",
        AnomalyStatus::Acknowledged => "acknowledged",
        AnomalyStatus::Resolved => "resolved",
    }
}

fn parse_anomaly_status(s: &str) -> AnomalyStatus {
    match s {
        "acknowledged" => AnomalyStatus::Acknowledged,
        "resolved" => AnomalyStatus::Resolved,
        _ => AnomalyStatus::Open,
    }
}

fn job_status_str(s: JobStatus) -> &'static str {
    match s {
        JobStatus::Success => "success",
        JobStatus::Failed => "failed",
        JobStatus::SkippedOverlap => "skipped_overlap",
    }
}

fn parse_job_status(s: &str) -> JobStatus {
    match s {
        "failed" => JobStatus::Failed,
        "skipped_overlap" => JobStatus::SkippedOverlap,
        _ => JobStatus::Success,
    }
}

impl PgDatabase {
    /// Connect to PostgreSQL and run migrations.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .with_context(|| format!("Failed to connect to PostgreSQL at {database_url}"))?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Run all pending migrations.
    ///
    /// Acquires a Postgres session-level advisory lock so that concurrent
    /// processes (e.g. two app instances starting together) don't race to
    /// apply the same migration.
    ///
    /// Session-level advisory locks are bound to the backend session that
    /// acquired them, so the lock and unlock MUST run on the same physical
    /// connection. We acquire a dedicated connection (`lock_conn`) for this
    /// purpose and keep it alive for the duration of the migration loop. The
    /// unlock always runs even if a migration fails — we capture the
    /// migration result first, then unlock, then surface any error.
    async fn run_migrations(&self) -> Result<()> {
        // 0x53454E54525947 = ASCII "SENTRYG" as a big-endian i64, truncated
        // to fit. Namespaces this lock to this application.
        const MIGRATION_LOCK_KEY: i64 = 0x53454E54525947_i64;

        let mut lock_conn = self
            .pool
            .acquire()
            .await
            .context("Failed to acquire connection for migration advisory lock")?;

        sqlx_core::query::query("SELECT pg_advisory_lock($1)")
            .bind(MIGRATION_LOCK_KEY)
            .execute(&mut *lock_conn)
            .await
            .context("Failed to acquire migration advisory lock")?;

        let migration_result: Result<()> = async {
            sqlx_core::query::query(
                "CREATE TABLE IF NOT EXISTS schema_version (
                    version INTEGER PRIMARY KEY,
                    applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                )",
            )
            .execute(&self.pool)
            .await?;

            let migrations = [(1, include_str!("../../migrations/postgres/0001_initial.sql"))];

            for (version, sql) in migrations {
                let applied: bool = sqlx_core::query::query(
                    "SELECT COUNT(*) > 0 FROM schema_version WHERE version = $1",
                )
                .bind(version)
                .fetch_one(&self.pool)
                .await
                .map(|row| row.get::<bool, _>(0))
                .unwrap_or(false);

                if !applied {
                    // All statements use IF NOT EXISTS, safe to retry if the
                    // process is interrupted partway through.
                    sqlx_core::raw_sql::raw_sql(sql).execute(&self.pool).await?;
                    sqlx_core::query::query(
                        "INSERT INTO schema_version (version) VALUES ($1)",
                    )
                    .bind(version)
                    .execute(&self.pool)
                    .await?;
                }
            }

            Ok(())
        }
        .await;

        let unlock_result = sqlx_core::query::query("SELECT pg_advisory_unlock($1)")
            .bind(MIGRATION_LOCK_KEY)
            .execute(&mut *lock_conn)
            .await
            .context("Failed to release migration advisory lock");

        migration_result?;
        unlock_result.map(|_| ())?;

        Ok(())
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn table_count(&self) -> Result<i64> {
        let row = sqlx_core::query::query(
            "SELECT COUNT(*)::bigint FROM information_schema.tables
             WHERE table_schema = 'public' AND table_type = 'BASE TABLE'",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get::<i64, _>(0))
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        let row = sqlx_core::query::query(
            "SELECT id, behavior_score, created_at, is_verified, weekly_score, last_updated, metadata
             FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| User {
            id: r.get(0),
            behavior_score: r.get(1),
            created_at: r.get(2),
            is_verified: r.get(3),
            weekly_score: r.get(4),
            last_updated: r.get(5),
            metadata: r.get(6),
        }))
    }

    async fn upsert_user(&self, user: &User) -> Result<()> {
        sqlx_core::query::query(
            "INSERT INTO users (id, behavior_score, created_at, is_verified, weekly_score, last_updated, metadata)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT(id) DO UPDATE SET
               behavior_score = $2, is_verified = $4, weekly_score = $5,
               last_updated = $6, metadata = $7",
        )
        .bind(&user.id)
        .bind(user.behavior_score)
        .bind(user.created_at)
        .bind(user.is_verified)
        .bind(user.weekly_score)
        .bind(user.last_updated)
        .bind(&user.metadata)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_risk_flag(&self, flag: &RiskFlag) -> Result<()> {
        sqlx_core::query::query(
            "INSERT INTO user_risk_flags (user_id, flag, severity, timestamp, metadata)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&flag.user_id)
        .bind(&flag.flag)
        .bind(severity_str(flag.severity))
        .bind(flag.timestamp)
        .bind(&flag.metadata)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_risk_flags_since(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<RiskFlag>> {
        let rows = sqlx_core::query::query(
            "SELECT user_id, flag, severity, timestamp, metadata FROM user_risk_flags
             WHERE user_id = $1 AND timestamp >= $2 ORDER BY timestamp DESC",
        )
        .bind(user_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|r| RiskFlag {
                user_id: r.get(0),
                flag: r.get(1),
                severity: parse_severity(r.get::<&str, _>(2)),
                timestamp: r.get(3),
                metadata: r.get(4),
            })
            .collect())
    }

    async fn get_all_risk_flags_since(&self, since: DateTime<Utc>) -> Result<Vec<RiskFlag>> {
        let rows = sqlx_core::query::query(
            "SELECT user_id, flag, severity, timestamp, metadata FROM user_risk_flags
             WHERE timestamp >= $1 ORDER BY timestamp DESC",
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|r| RiskFlag {
                user_id: r.get(0),
                flag: r.get(1),
                severity: parse_severity(r.get::<&str, _>(2)),
                timestamp: r.get(3),
                metadata: r.get(4),
            })
            .collect())
    }

    async fn insert_fingerprint(&self, record: &FingerprintRecord) -> Result<()> {
        sqlx_core::query::query(
            "INSERT INTO fingerprint_data
             (user_id, event_type, ip, user_agent, device_hash, timestamp, confidence, geo, browser_details)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(&record.user_id)
        .bind(record.event_type.as_str())
        .bind(&record.ip)
        .bind(&record.user_agent)
        .bind(&record.device_hash)
        .bind(record.timestamp)
        .bind(record.confidence)
        .bind(&record.geo)
        .bind(&record.browser_details)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_fingerprints_since(&self, since: DateTime<Utc>) -> Result<Vec<FingerprintRecord>> {
        let rows = sqlx_core::query::query(
            "SELECT user_id, event_type, ip, user_agent, device_hash, timestamp, confidence, geo, browser_details
             FROM fingerprint_data WHERE timestamp > $1 ORDER BY timestamp ASC",
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_fingerprint).collect())
    }

    async fn get_user_fingerprints_since(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<FingerprintRecord>> {
        let rows = sqlx_core::query::query(
            "SELECT user_id, event_type, ip, user_agent, device_hash, timestamp, confidence, geo, browser_details
             FROM fingerprint_data WHERE user_id = $1 AND timestamp > $2
             ORDER BY timestamp DESC LIMIT $3",
        )
        .bind(user_id)
        .bind(since)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_fingerprint).collect())
    }

    async fn insert_anomaly(&self, anomaly: &Anomaly) -> Result<()> {
        sqlx_core::query::query(
            "INSERT INTO detected_anomalies
             (pattern_name, severity, affected_users, fingerprint_data, risk_score, detected_at, status)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(&anomaly.pattern_name)
        .bind(severity_str(anomaly.severity))
        .bind(serde_json::to_value(&anomaly.affected_users)?)
        .bind(&anomaly.fingerprint_data)
        .bind(anomaly.risk_score)
        .bind(anomaly.detected_at)
        .bind(anomaly_status_str(anomaly.status))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_anomalies_since(&self, since: DateTime<Utc>) -> Result<Vec<Anomaly>> {
        let rows = sqlx_core::query::query(
            "SELECT pattern_name, severity, affected_users, fingerprint_data, risk_score, detected_at, status
             FROM detected_anomalies WHERE detected_at >= $1 ORDER BY detected_at DESC",
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|r| Anomaly {
                pattern_name: r.get(0),
                severity: parse_severity(r.get::<&str, _>(1)),
                affected_users: serde_json::from_value(r.get(2)).unwrap_or_default(),
                fingerprint_data: r.get(3),
                risk_score: r.get(4),
                detected_at: r.get(5),
                status: parse_anomaly_status(r.get::<&str, _>(6)),
            })
            .collect())
    }

    async fn replace_leaderboard(&self, entries: &[LeaderboardEntry]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx_core::query::query("DELETE FROM leaderboard")
            .execute(&mut *tx)
            .await?;
        for entry in entries {
            sqlx_core::query::query(
                "INSERT INTO leaderboard
                 (user_id, position, behavior_score, previous_position, position_change, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(&entry.user_id)
            .bind(entry.position as i32)
            .bind(entry.behavior_score)
            .bind(entry.previous_position.map(|v| v as i32))
            .bind(entry.position_change)
            .bind(entry.created_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_leaderboard(&self) -> Result<Vec<LeaderboardEntry>> {
        let rows = sqlx_core::query::query(
            "SELECT user_id, position, behavior_score, previous_position, position_change, created_at
             FROM leaderboard ORDER BY position ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|r| LeaderboardEntry {
                user_id: r.get(0),
                position: r.get::<i32, _>(1) as u32,
                behavior_score: r.get(2),
                previous_position: r.get::<Option<i32>, _>(3).map(|v| v as u32),
                position_change: r.get(4),
                created_at: r.get(5),
            })
            .collect())
    }

    async fn archive_leaderboard_snapshot(&self, entries: &[LeaderboardEntry]) -> Result<()> {
        sqlx_core::query::query("INSERT INTO weekly_leaderboard_archive (snapshot) VALUES ($1)")
            .bind(serde_json::to_value(entries)?)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn prune_leaderboard_archive(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let result = sqlx_core::query::query(
            "DELETE FROM weekly_leaderboard_archive WHERE archived_at < $1",
        )
        .bind(older_than)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn insert_challenge(&self, challenge: &Challenge) -> Result<()> {
        sqlx_core::query::query(
            "INSERT INTO weekly_challenges
             (id, challenge_type, description, start_date, end_date, reward_points, active)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT(id) DO UPDATE SET
               description = $3, end_date = $5, active = $7",
        )
        .bind(&challenge.id)
        .bind(&challenge.challenge_type)
        .bind(&challenge.description)
        .bind(challenge.start_date)
        .bind(challenge.end_date)
        .bind(challenge.reward_points as i32)
        .bind(challenge.active)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_active_challenges(&self, now: DateTime<Utc>) -> Result<Vec<Challenge>> {
        let rows = sqlx_core::query::query(
            "SELECT id, challenge_type, description, start_date, end_date, reward_points, active
             FROM weekly_challenges WHERE active = TRUE AND end_date > $1",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|r| Challenge {
                id: r.get(0),
                challenge_type: r.get(1),
                description: r.get(2),
                start_date: r.get(3),
                end_date: r.get(4),
                reward_points: r.get::<i32, _>(5) as u32,
                active: r.get(6),
            })
            .collect())
    }

    async fn deactivate_expired_challenges(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx_core::query::query(
            "UPDATE weekly_challenges SET active = FALSE WHERE active = TRUE AND end_date <= $1",
        )
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn get_all_users(&self) -> Result<Vec<User>> {
        let rows = sqlx_core::query::query(
            "SELECT id, behavior_score, created_at, is_verified, weekly_score, last_updated, metadata
             FROM users",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|r| User {
                id: r.get(0),
                behavior_score: r.get(1),
                created_at: r.get(2),
                is_verified: r.get(3),
                weekly_score: r.get(4),
                last_updated: r.get(5),
                metadata: r.get(6),
            })
            .collect())
    }

    async fn reset_weekly_scores(&self) -> Result<u64> {
        let result = sqlx_core::query::query("UPDATE users SET weekly_score = 0.0")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn insert_job_log(&self, log: &JobLog) -> Result<()> {
        sqlx_core::query::query(
            "INSERT INTO logs_scheduled_jobs (job_name, timestamp, status, error, metadata)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&log.job_name)
        .bind(log.timestamp)
        .bind(job_status_str(log.status))
        .bind(&log.error)
        .bind(&log.metadata)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_last_job_log(&self, job_name: &str) -> Result<Option<JobLog>> {
        let row = sqlx_core::query::query(
            "SELECT job_name, timestamp, status, error, metadata FROM logs_scheduled_jobs
             WHERE job_name = $1 ORDER BY timestamp DESC LIMIT 1",
        )
        .bind(job_name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| JobLog {
            job_name: r.get(0),
            timestamp: r.get(1),
            status: parse_job_status(r.get::<&str, _>(2)),
            error: r.get(3),
            metadata: r.get(4),
        }))
    }

    async fn insert_alert(&self, alert: &Alert) -> Result<()> {
        sqlx_core::query::query(
            "INSERT INTO admin_alerts (alert_type, priority, summary, details, status, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&alert.alert_type)
        .bind(severity_str(alert.priority))
        .bind(&alert.summary)
        .bind(&alert.details)
        .bind(anomaly_status_str(alert.status))
        .bind(alert.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_access_log(
        &self,
        user_id: &str,
        operation: &str,
        granted: bool,
        reason: Option<&str>,
        access_level: Option<&str>,
    ) -> Result<()> {
        sqlx_core::query::query(
            "INSERT INTO access_logs (user_id, operation, granted, reason, access_level)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(user_id)
        .bind(operation)
        .bind(granted)
        .bind(reason)
        .bind(access_level)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_bot_detection(
        &self,
        user_id: Option<&str>,
        bot_probability: f64,
        signals: &[String],
        rejected: bool,
    ) -> Result<()> {
        sqlx_core::query::query(
            "INSERT INTO bot_detections (user_id, bot_probability, signals, rejected)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(user_id)
        .bind(bot_probability)
        .bind(serde_json::to_value(signals)?)
        .bind(rejected)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_fake_referral_detection(
        &self,
        user_id: &str,
        signals: &[String],
        rejected: bool,
    ) -> Result<()> {
        sqlx_core::query::query(
            "INSERT INTO fake_referral_detections (user_id, signals, rejected)
             VALUES ($1, $2, $3)",
        )
        .bind(user_id)
        .bind(serde_json::to_value(signals)?)
        .bind(rejected)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_skipped_payload(
        &self,
        reason: &str,
        payload: &serde_json::Value,
    ) -> Result<()> {
        sqlx_core::query::query("INSERT INTO skipped_payloads (reason, payload) VALUES ($1, $2)")
            .bind(reason)
            .bind(payload)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_audit_log(
        &self,
        actor: Option<&str>,
        action: &str,
        details: &serde_json::Value,
    ) -> Result<()> {
        sqlx_core::query::query("INSERT INTO audit_logs (actor, action, details) VALUES ($1, $2, $3)")
            .bind(actor)
            .bind(action)
            .bind(details)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_ingress_stats_since(&self, since: DateTime<Utc>) -> Result<IngressStats> {
        async fn count(pool: &PgPool, sql: &str, since: DateTime<Utc>) -> Result<i64> {
            let row = sqlx_core::query::query(sql).bind(since).fetch_one(pool).await.context("count query failed")?;
            Ok(row.get::<i64, _>(0))
        }

        Ok(IngressStats {
            events_processed: count(&self.pool, "SELECT COUNT(*)::bigint FROM fingerprint_data WHERE timestamp >= $1", since).await?,
            risk_flags_raised: count(&self.pool, "SELECT COUNT(*)::bigint FROM user_risk_flags WHERE timestamp >= $1", since).await?,
            anomalies_detected: count(&self.pool, "SELECT COUNT(*)::bigint FROM detected_anomalies WHERE detected_at >= $1", since).await?,
            bot_detections_total: count(&self.pool, "SELECT COUNT(*)::bigint FROM bot_detections WHERE created_at >= $1", since).await?,
            bot_detections_rejected: count(
                &self.pool,
                "SELECT COUNT(*)::bigint FROM bot_detections WHERE created_at >= $1 AND rejected = true",
                since,
            )
            .await?,
            fake_referral_detections_total: count(
                &self.pool,
                "SELECT COUNT(*)::bigint FROM fake_referral_detections WHERE created_at >= $1",
                since,
            )
            .await?,
            fake_referral_detections_rejected: count(
                &self.pool,
                "SELECT COUNT(*)::bigint FROM fake_referral_detections WHERE created_at >= $1 AND rejected = true",
                since,
            )
            .await?,
        })
    }
}

fn row_to_fingerprint(r: &sqlx_postgres::PgRow) -> FingerprintRecord {
    let event_type_raw: &str = r.get(1);
    FingerprintRecord {
        user_id: r.get(0),
        event_type: parse_event_type(event_type_raw),
        ip: r.get(2),
        user_agent: r.get(3),
        device_hash: r.get(4),
        timestamp: r.get(5),
        confidence: r.get(6),
        geo: r.get(7),
        browser_details: r.get(8),
    }
}

fn parse_event_type(s: &str) -> crate::model::EventType {
    use crate::model::EventType::*;
    match s {
        "login" => Login,
        "signup" => Signup,
        "referral" => Referral,
        "meme_upload" => MemeUpload,
        "social_interaction" => SocialInteraction,
        "form_submission" => FormSubmission,
        "wallet_connection" => WalletConnection,
        "nft_listing" => NftListing,
        "click" => Click,
        _ => PageView,
    }
}
