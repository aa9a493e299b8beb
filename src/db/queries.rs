// Database queries — raw rusqlite SQL for all tables.
//
// Every database interaction goes through this module. This keeps SQL
// contained in one place; `sqlite::SqliteDatabase` wraps these behind the
// shared `Database` trait.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::model::{
    Alert, Anomaly, AnomalyStatus, Challenge, FingerprintRecord, IngressStats, JobLog, JobStatus,
    LeaderboardEntry, RiskFlag, Severity, User,
};

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_severity(s: &str) -> Severity {
    match s {
        "LOW" => Severity::Low,
        "HIGH" => Severity::High,
        _ => Severity::Med,
    }
}

fn parse_anomaly_status(s: &str) -> AnomalyStatus {
    match s {
        "acknowledged" => AnomalyStatus::Acknowledged,
        "resolved" => AnomalyStatus::Resolved,
        _ => AnomalyStatus::Open,
    }
}

fn parse_job_status(s: &str) -> JobStatus {
    match s {
        "failed" => JobStatus::Failed,
        "skipped_overlap" => JobStatus::SkippedOverlap,
        _ => JobStatus::Success,
    }
}

// --- Users ---

fn row_to_user(row: &Row) -> rusqlite::Result<User> {
    let metadata_raw: String = row.get("metadata")?;
    Ok(User {
        id: row.get("id")?,
        behavior_score: row.get("behavior_score")?,
        created_at: parse_ts(&row.get::<_, String>("created_at")?),
        is_verified: row.get::<_, i64>("is_verified")? != 0,
        weekly_score: row.get("weekly_score")?,
        last_updated: parse_ts(&row.get::<_, String>("last_updated")?),
        metadata: serde_json::from_str(&metadata_raw).unwrap_or(serde_json::json!({})),
    })
}

pub fn get_user(conn: &Connection, user_id: &str) -> Result<Option<User>> {
    conn.query_row(
        "SELECT id, behavior_score, created_at, is_verified, weekly_score, last_updated, metadata
         FROM users WHERE id = ?1",
        params![user_id],
        row_to_user,
    )
    .optional()
    .context("get_user failed")
}

pub fn upsert_user(conn: &Connection, user: &User) -> Result<()> {
    conn.execute(
        "INSERT INTO users (id, behavior_score, created_at, is_verified, weekly_score, last_updated, metadata)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(id) DO UPDATE SET
           behavior_score = excluded.behavior_score,
           is_verified = excluded.is_verified,
           weekly_score = excluded.weekly_score,
           last_updated = excluded.last_updated,
           metadata = excluded.metadata",
        params![
            user.id,
            user.behavior_score,
            user.created_at.to_rfc3339(),
            user.is_verified as i64,
            user.weekly_score,
            user.last_updated.to_rfc3339(),
            user.metadata.to_string(),
        ],
    )
    .context("upsert_user failed")?;
    Ok(())
}

pub fn get_all_users(conn: &Connection) -> Result<Vec<User>> {
    let mut stmt = conn.prepare(
        "SELECT id, behavior_score, created_at, is_verified, weekly_score, last_updated, metadata
         FROM users",
    )?;
    let rows = stmt
        .query_map([], row_to_user)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("get_all_users failed")?;
    Ok(rows)
}

pub fn reset_weekly_scores(conn: &Connection) -> Result<u64> {
    let n = conn
        .execute("UPDATE users SET weekly_score = 0.0", [])
        .context("reset_weekly_scores failed")?;
    Ok(n as u64)
}

// --- Risk flags ---

fn row_to_risk_flag(row: &Row) -> rusqlite::Result<RiskFlag> {
    let metadata_raw: String = row.get("metadata")?;
    Ok(RiskFlag {
        user_id: row.get("user_id")?,
        flag: row.get("flag")?,
        severity: parse_severity(&row.get::<_, String>("severity")?),
        timestamp: parse_ts(&row.get::<_, String>("timestamp")?),
        metadata: serde_json::from_str(&metadata_raw).unwrap_or(serde_json::json!({})),
    })
}

pub fn insert_risk_flag(conn: &Connection, flag: &RiskFlag) -> Result<()> {
    conn.execute(
        "INSERT INTO user_risk_flags (user_id, flag, severity, timestamp, metadata)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            flag.user_id,
            flag.flag,
            flag.severity.as_str(),
            flag.timestamp.to_rfc3339(),
            flag.metadata.to_string(),
        ],
    )
    .context("insert_risk_flag failed")?;
    Ok(())
}

pub fn get_risk_flags_since(
    conn: &Connection,
    user_id: &str,
    since: DateTime<Utc>,
) -> Result<Vec<RiskFlag>> {
    let mut stmt = conn.prepare(
        "SELECT user_id, flag, severity, timestamp, metadata FROM user_risk_flags
         WHERE user_id = ?1 AND timestamp >= ?2 ORDER BY timestamp DESC",
    )?;
    let rows = stmt
        .query_map(params![user_id, since.to_rfc3339()], row_to_risk_flag)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("get_risk_flags_since failed")?;
    Ok(rows)
}

pub fn get_all_risk_flags_since(conn: &Connection, since: DateTime<Utc>) -> Result<Vec<RiskFlag>> {
    let mut stmt = conn.prepare(
        "SELECT user_id, flag, severity, timestamp, metadata FROM user_risk_flags
         WHERE timestamp >= ?1 ORDER BY timestamp DESC",
    )?;
    let rows = stmt
        .query_map(params![since.to_rfc3339()], row_to_risk_flag)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("get_all_risk_flags_since failed")?;
    Ok(rows)
}

// --- Fingerprint records ---

fn row_to_fingerprint(row: &Row) -> rusqlite::Result<FingerprintRecord> {
    let event_type_raw: String = row.get("event_type")?;
    let browser_details_raw: Option<String> = row.get("browser_details")?;
    Ok(FingerprintRecord {
        user_id: row.get("user_id")?,
        event_type: parse_event_type(&event_type_raw),
        ip: row.get("ip")?,
        user_agent: row.get("user_agent")?,
        device_hash: row.get("device_hash")?,
        timestamp: parse_ts(&row.get::<_, String>("timestamp")?),
        confidence: row.get("confidence")?,
        geo: row.get("geo")?,
        browser_details: browser_details_raw.and_then(|s| serde_json::from_str(&s).ok()),
    })
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

pub fn insert_fingerprint(conn: &Connection, record: &FingerprintRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO fingerprint_data
         (user_id, event_type, ip, user_agent, device_hash, timestamp, confidence, geo, browser_details)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            record.user_id,
            record.event_type.as_str(),
            record.ip,
            record.user_agent,
            record.device_hash,
            record.timestamp.to_rfc3339(),
            record.confidence,
            record.geo,
            record.browser_details.as_ref().map(|v| v.to_string()),
        ],
    )
    .context("insert_fingerprint failed")?;
    Ok(())
}

pub fn get_fingerprints_since(
    conn: &Connection,
    since: DateTime<Utc>,
) -> Result<Vec<FingerprintRecord>> {
    let mut stmt = conn.prepare(
        "SELECT user_id, event_type, ip, user_agent, device_hash, timestamp, confidence, geo, browser_details
         FROM fingerprint_data WHERE timestamp > ?1 ORDER BY timestamp ASC",
    )?;
    let rows = stmt
        .query_map(params![since.to_rfc3339()], row_to_fingerprint)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("get_fingerprints_since failed")?;
    Ok(rows)
}

pub fn get_user_fingerprints_since(
    conn: &Connection,
    user_id: &str,
    since: DateTime<Utc>,
    limit: u32,
) -> Result<Vec<FingerprintRecord>> {
    let mut stmt = conn.prepare(
        "SELECT user_id, event_type, ip, user_agent, device_hash, timestamp, confidence, geo, browser_details
         FROM fingerprint_data WHERE user_id = ?1 AND timestamp > ?2
         ORDER BY timestamp DESC LIMIT ?3",
    )?;
    let rows = stmt
        .query_map(
            params![user_id, since.to_rfc3339(), limit],
            row_to_fingerprint,
        )?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("get_user_fingerprints_since failed")?;
    Ok(rows)
}

// --- Anomalies ---

fn row_to_anomaly(row: &Row) -> rusqlite::Result<Anomaly> {
    let affected_raw: String = row.get("affected_users")?;
    let fp_raw: String = row.get("fingerprint_data")?;
    let affected_users: std::collections::BTreeSet<String> =
        serde_json::from_str(&affected_raw).unwrap_or_default();
    Ok(Anomaly {
        pattern_name: row.get("pattern_name")?,
        severity: parse_severity(&row.get::<_, String>("severity")?),
        affected_users,
        fingerprint_data: serde_json::from_str(&fp_raw).unwrap_or(serde_json::json!({})),
        risk_score: row.get("risk_score")?,
        detected_at: parse_ts(&row.get::<_, String>("detected_at")?),
        status: parse_anomaly_status(&row.get::<_, String>("status")?),
    })
}

pub fn insert_anomaly(conn: &Connection, anomaly: &Anomaly) -> Result<()> {
    conn.execute(
        "INSERT INTO detected_anomalies
         (pattern_name, severity, affected_users, fingerprint_data, risk_score, detected_at, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            anomaly.pattern_name,
            anomaly.severity.as_str(),
            serde_json::to_string(&anomaly.affected_users)?,
            anomaly.fingerprint_data.to_string(),
            anomaly.risk_score,
            anomaly.detected_at.to_rfc3339(),
            match anomaly.status {
                AnomalyStatus::Open => "open",
                AnomalyStatus::Acknowledged => "acknowledged",
                AnomalyStatus::Resolved => "resolved",
            },
        ],
    )
    .context("insert_anomaly failed")?;
    Ok(())
}

pub fn get_anomalies_since(conn: &Connection, since: DateTime<Utc>) -> Result<Vec<Anomaly>> {
    let mut stmt = conn.prepare(
        "SELECT pattern_name, severity, affected_users, fingerprint_data, risk_score, detected_at, status
         FROM detected_anomalies WHERE detected_at >= ?1 ORDER BY detected_at DESC",
    )?;
    let rows = stmt
        .query_map(params![since.to_rfc3339()], row_to_anomaly)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("get_anomalies_since failed")?;
    Ok(rows)
}

// --- Leaderboard ---

fn row_to_leaderboard_entry(row: &Row) -> rusqlite::Result<LeaderboardEntry> {
    Ok(LeaderboardEntry {
        user_id: row.get("user_id")?,
        position: row.get::<_, i64>("position")? as u32,
        behavior_score: row.get("behavior_score")?,
        previous_position: row
            .get::<_, Option<i64>>("previous_position")?
            .map(|v| v as u32),
        position_change: row.get::<_, Option<i64>>("position_change")?.map(|v| v as i32),
        created_at: parse_ts(&row.get::<_, String>("created_at")?),
    })
}

pub fn replace_leaderboard(conn: &Connection, entries: &[LeaderboardEntry]) -> Result<()> {
    conn.execute("DELETE FROM leaderboard", [])
        .context("clearing leaderboard failed")?;
    for entry in entries {
        conn.execute(
            "INSERT INTO leaderboard
             (user_id, position, behavior_score, previous_position, position_change, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.user_id,
                entry.position,
                entry.behavior_score,
                entry.previous_position,
                entry.position_change,
                entry.created_at.to_rfc3339(),
            ],
        )
        .context("insert leaderboard entry failed")?;
    }
    Ok(())
}

pub fn get_leaderboard(conn: &Connection) -> Result<Vec<LeaderboardEntry>> {
    let mut stmt = conn.prepare(
        "SELECT user_id, position, behavior_score, previous_position, position_change, created_at
         FROM leaderboard ORDER BY position ASC",
    )?;
    let rows = stmt
        .query_map([], row_to_leaderboard_entry)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("get_leaderboard failed")?;
    Ok(rows)
}

pub fn archive_leaderboard_snapshot(conn: &Connection, entries: &[LeaderboardEntry]) -> Result<()> {
    let snapshot = serde_json::to_string(entries)?;
    conn.execute(
        "INSERT INTO weekly_leaderboard_archive (snapshot) VALUES (?1)",
        params![snapshot],
    )
    .context("archive_leaderboard_snapshot failed")?;
    Ok(())
}

pub fn prune_leaderboard_archive(conn: &Connection, older_than: DateTime<Utc>) -> Result<u64> {
    let n = conn
        .execute(
            "DELETE FROM weekly_leaderboard_archive WHERE archived_at < ?1",
            params![older_than.to_rfc3339()],
        )
        .context("prune_leaderboard_archive failed")?;
    Ok(n as u64)
}

// --- Challenges ---

fn row_to_challenge(row: &Row) -> rusqlite::Result<Challenge> {
    Ok(Challenge {
        id: row.get("id")?,
        challenge_type: row.get("challenge_type")?,
        description: row.get("description")?,
        start_date: parse_ts(&row.get::<_, String>("start_date")?),
        end_date: parse_ts(&row.get::<_, String>("end_date")?),
        reward_points: row.get::<_, i64>("reward_points")? as u32,
        active: row.get::<_, i64>("active")? != 0,
    })
}

pub fn insert_challenge(conn: &Connection, challenge: &Challenge) -> Result<()> {
    conn.execute(
        "INSERT INTO weekly_challenges
         (id, challenge_type, description, start_date, end_date, reward_points, active)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(id) DO UPDATE SET
           description = excluded.description,
           end_date = excluded.end_date,
           active = excluded.active",
        params![
            challenge.id,
            challenge.challenge_type,
            challenge.description,
            challenge.start_date.to_rfc3339(),
            challenge.end_date.to_rfc3339(),
            challenge.reward_points,
            challenge.active as i64,
        ],
    )
    .context("insert_challenge failed")?;
    Ok(())
}

pub fn get_active_challenges(conn: &Connection, now: DateTime<Utc>) -> Result<Vec<Challenge>> {
    let mut stmt = conn.prepare(
        "SELECT id, challenge_type, description, start_date, end_date, reward_points, active
         FROM weekly_challenges WHERE active = 1 AND end_date > ?1",
    )?;
    let rows = stmt
        .query_map(params![now.to_rfc3339()], row_to_challenge)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("get_active_challenges failed")?;
    Ok(rows)
}

pub fn deactivate_expired_challenges(conn: &Connection, now: DateTime<Utc>) -> Result<u64> {
    let n = conn
        .execute(
            "UPDATE weekly_challenges SET active = 0 WHERE active = 1 AND end_date <= ?1",
            params![now.to_rfc3339()],
        )
        .context("deactivate_expired_challenges failed")?;
    Ok(n as u64)
}

// --- Job log ---

fn row_to_job_log(row: &Row) -> rusqlite::Result<JobLog> {
    let metadata_raw: String = row.get("metadata")?;
    Ok(JobLog {
        job_name: row.get("job_name")?,
        timestamp: parse_ts(&row.get::<_, String>("timestamp")?),
        status: parse_job_status(&row.get::<_, String>("status")?),
        error: row.get("error")?,
        metadata: serde_json::from_str(&metadata_raw).unwrap_or(serde_json::json!({})),
    })
}

pub fn insert_job_log(conn: &Connection, log: &JobLog) -> Result<()> {
    conn.execute(
        "INSERT INTO logs_scheduled_jobs (job_name, timestamp, status, error, metadata)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            log.job_name,
            log.timestamp.to_rfc3339(),
            match log.status {
                JobStatus::Success => "success",
                JobStatus::Failed => "failed",
                JobStatus::SkippedOverlap => "skipped_overlap",
            },
            log.error,
            log.metadata.to_string(),
        ],
    )
    .context("insert_job_log failed")?;
    Ok(())
}

pub fn get_last_job_log(conn: &Connection, job_name: &str) -> Result<Option<JobLog>> {
    conn.query_row(
        "SELECT job_name, timestamp, status, error, metadata FROM logs_scheduled_jobs
         WHERE job_name = ?1 ORDER BY timestamp DESC LIMIT 1",
        params![job_name],
        row_to_job_log,
    )
    .optional()
    .context("get_last_job_log failed")
}

// --- Alerts ---

pub fn insert_alert(conn: &Connection, alert: &Alert) -> Result<()> {
    conn.execute(
        "INSERT INTO admin_alerts (alert_type, priority, summary, details, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            alert.alert_type,
            alert.priority.as_str(),
            alert.summary,
            alert.details.to_string(),
            match alert.status {
                AnomalyStatus::Open => "open",
                AnomalyStatus::Acknowledged => "acknowledged",
                AnomalyStatus::Resolved => "resolved",
            },
            alert.created_at.to_rfc3339(),
        ],
    )
    .context("insert_alert failed")?;
    Ok(())
}

// --- Access logs ---

#[allow(clippy::too_many_arguments)]
pub fn insert_access_log(
    conn: &Connection,
    user_id: &str,
    operation: &str,
    granted: bool,
    reason: Option<&str>,
    access_level: Option<&str>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO access_logs (user_id, operation, granted, reason, access_level)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![user_id, operation, granted as i64, reason, access_level],
    )
    .context("insert_access_log failed")?;
    Ok(())
}

// --- Diagnostics ---

pub fn insert_bot_detection(
    conn: &Connection,
    user_id: Option<&str>,
    bot_probability: f64,
    signals: &[String],
    rejected: bool,
) -> Result<()> {
    conn.execute(
        "INSERT INTO bot_detections (user_id, bot_probability, signals, rejected, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            user_id,
            bot_probability,
            serde_json::to_string(signals)?,
            rejected as i64,
            Utc::now().to_rfc3339(),
        ],
    )
    .context("insert_bot_detection failed")?;
    Ok(())
}

pub fn insert_fake_referral_detection(
    conn: &Connection,
    user_id: &str,
    signals: &[String],
    rejected: bool,
) -> Result<()> {
    conn.execute(
        "INSERT INTO fake_referral_detections (user_id, signals, rejected, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![user_id, serde_json::to_string(signals)?, rejected as i64, Utc::now().to_rfc3339()],
    )
    .context("insert_fake_referral_detection failed")?;
    Ok(())
}

pub fn insert_skipped_payload(
    conn: &Connection,
    reason: &str,
    payload: &serde_json::Value,
) -> Result<()> {
    conn.execute(
        "INSERT INTO skipped_payloads (reason, payload) VALUES (?1, ?2)",
        params![reason, payload.to_string()],
    )
    .context("insert_skipped_payload failed")?;
    Ok(())
}

pub fn insert_audit_log(
    conn: &Connection,
    actor: Option<&str>,
    action: &str,
    details: &serde_json::Value,
) -> Result<()> {
    conn.execute(
        "INSERT INTO audit_logs (actor, action, details) VALUES (?1, ?2, ?3)",
        params![actor, action, details.to_string()],
    )
    .context("insert_audit_log failed")?;
    Ok(())
}

fn count_since(conn: &Connection, sql: &str, since: DateTime<Utc>) -> Result<i64> {
    conn.query_row(sql, params![since.to_rfc3339()], |row| row.get(0))
        .context("count_since failed")
}

pub fn get_ingress_stats_since(conn: &Connection, since: DateTime<Utc>) -> Result<IngressStats> {
    Ok(IngressStats {
        events_processed: count_since(
            conn,
            "SELECT COUNT(*) FROM fingerprint_data WHERE timestamp >= ?1",
            since,
        )?,
        risk_flags_raised: count_since(
            conn,
            "SELECT COUNT(*) FROM user_risk_flags WHERE timestamp >= ?1",
            since,
        )?,
        anomalies_detected: count_since(
            conn,
            "SELECT COUNT(*) FROM detected_anomalies WHERE detected_at >= ?1",
            since,
        )?,
        bot_detections_total: count_since(
            conn,
            "SELECT COUNT(*) FROM bot_detections WHERE created_at >= ?1",
            since,
        )?,
        bot_detections_rejected: count_since(
            conn,
            "SELECT COUNT(*) FROM bot_detections WHERE created_at >= ?1 AND rejected = 1",
            since,
        )?,
        fake_referral_detections_total: count_since(
            conn,
            "SELECT COUNT(*) FROM fake_referral_detections WHERE created_at >= ?1",
            since,
        )?,
        fake_referral_detections_rejected: count_since(
            conn,
            "SELECT COUNT(*) FROM fake_referral_detections WHERE created_at >= ?1 AND rejected = 1",
            since,
        )?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::create_tables;
    use crate::model::EventType;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        conn
    }

    #[test]
    fn test_upsert_user_then_get_roundtrips() {
        let conn = setup();
        let mut user = User {
            id: "u1".into(),
            ..Default::default()
        };
        upsert_user(&conn, &user).unwrap();
        let fetched = get_user(&conn, "u1").unwrap().unwrap();
        assert_eq!(fetched.behavior_score, 100.0);

        user.behavior_score = 42.0;
        upsert_user(&conn, &user).unwrap();
        let fetched = get_user(&conn, "u1").unwrap().unwrap();
        assert_eq!(fetched.behavior_score, 42.0);
    }

    #[test]
    fn test_get_user_missing_returns_none() {
        let conn = setup();
        assert!(get_user(&conn, "nobody").unwrap().is_none());
    }

    #[test]
    fn test_fingerprint_window_query_respects_since_and_limit() {
        let conn = setup();
        let now = Utc::now();
        for i in 0..5 {
            insert_fingerprint(
                &conn,
                &FingerprintRecord {
                    user_id: "u1".into(),
                    event_type: EventType::Click,
                    ip: "1.2.3.4".into(),
                    user_agent: "ua".into(),
                    device_hash: "h".into(),
                    timestamp: now - chrono::Duration::minutes(i),
                    confidence: 1.0,
                    geo: None,
                    browser_details: None,
                },
            )
            .unwrap();
        }
        let rows = get_user_fingerprints_since(&conn, "u1", now - chrono::Duration::hours(1), 3)
            .unwrap();
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn test_leaderboard_replace_is_atomic_swap() {
        let conn = setup();
        let now = Utc::now();
        replace_leaderboard(
            &conn,
            &[LeaderboardEntry {
                user_id: "u1".into(),
                position: 1,
                behavior_score: 99.0,
                previous_position: None,
                position_change: None,
                created_at: now,
            }],
        )
        .unwrap();
        replace_leaderboard(
            &conn,
            &[LeaderboardEntry {
                user_id: "u2".into(),
                position: 1,
                behavior_score: 88.0,
                previous_position: None,
                position_change: None,
                created_at: now,
            }],
        )
        .unwrap();
        let board = get_leaderboard(&conn).unwrap();
        assert_eq!(board.len(), 1);
        assert_eq!(board[0].user_id, "u2");
    }

    #[test]
    fn test_ingress_stats_counts_within_window_only() {
        let conn = setup();
        let now = Utc::now();
        insert_bot_detection(&conn, Some("u1"), 0.9, &["bot_keyword".to_string()], true).unwrap();
        insert_bot_detection(&conn, Some("u2"), 0.1, &[], false).unwrap();
        insert_fake_referral_detection(&conn, "u1", &["excessive_ip_referrals".to_string()], true).unwrap();

        let stats = get_ingress_stats_since(&conn, now - chrono::Duration::hours(24)).unwrap();
        assert_eq!(stats.bot_detections_total, 2);
        assert_eq!(stats.bot_detections_rejected, 1);
        assert_eq!(stats.fake_referral_detections_total, 1);
        assert_eq!(stats.fake_referral_detections_rejected, 1);

        let stats_future = get_ingress_stats_since(&conn, now + chrono::Duration::hours(1)).unwrap();
        assert_eq!(stats_future.bot_detections_total, 0);
    }

    #[test]
    fn test_active_challenges_excludes_expired() {
        let conn = setup();
        let now = Utc::now();
        insert_challenge(
            &conn,
            &Challenge {
                id: "c1".into(),
                challenge_type: "meme".into(),
                description: "d".into(),
                start_date: now - chrono::Duration::days(10),
                end_date: now - chrono::Duration::days(1),
                reward_points: 10,
                active: true,
            },
        )
        .unwrap();
        assert!(get_active_challenges(&conn, now).unwrap().is_empty());
    }
}
