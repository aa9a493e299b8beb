// Database schema — table creation and migrations.
//
// We use a simple version-based migration approach: a `schema_version`
// table tracks which migrations have run, and each migration is a
// function that executes SQL statements.
//
// Table names are part of the external contract and must match exactly
// (see the persisted-state list in the external-interfaces design).

use anyhow::{Context, Result};
use rusqlite::Connection;

/// Create all tables if they don't exist yet.
///
/// This is idempotent — safe to call on every startup.
pub fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            behavior_score REAL NOT NULL DEFAULT 100.0,
            created_at TEXT NOT NULL,
            is_verified INTEGER NOT NULL DEFAULT 0,
            weekly_score REAL NOT NULL DEFAULT 0.0,
            last_updated TEXT NOT NULL,
            metadata TEXT NOT NULL DEFAULT '{}'
        );

        CREATE TABLE IF NOT EXISTS user_risk_flags (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL,
            flag TEXT NOT NULL,
            severity TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            metadata TEXT NOT NULL DEFAULT '{}'
        );

        CREATE TABLE IF NOT EXISTS fingerprint_data (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL,
            event_type TEXT NOT NULL,
            ip TEXT NOT NULL,
            user_agent TEXT NOT NULL,
            device_hash TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            confidence REAL NOT NULL,
            geo TEXT,
            browser_details TEXT
        );

        CREATE TABLE IF NOT EXISTS detected_anomalies (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            pattern_name TEXT NOT NULL,
            severity TEXT NOT NULL,
            affected_users TEXT NOT NULL,
            fingerprint_data TEXT NOT NULL DEFAULT '{}',
            risk_score REAL NOT NULL,
            detected_at TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'open'
        );

        CREATE TABLE IF NOT EXISTS generated_memes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL,
            prompt TEXT NOT NULL,
            tone TEXT,
            base_image TEXT,
            result_url TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS leaderboard (
            user_id TEXT PRIMARY KEY,
            position INTEGER NOT NULL,
            behavior_score REAL NOT NULL,
            previous_position INTEGER,
            position_change INTEGER,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS weekly_leaderboard_archive (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            archived_at TEXT NOT NULL DEFAULT (datetime('now')),
            snapshot TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS weekly_challenges (
            id TEXT PRIMARY KEY,
            challenge_type TEXT NOT NULL,
            description TEXT NOT NULL,
            start_date TEXT NOT NULL,
            end_date TEXT NOT NULL,
            reward_points INTEGER NOT NULL,
            active INTEGER NOT NULL DEFAULT 1
        );

        CREATE TABLE IF NOT EXISTS logs_scheduled_jobs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            job_name TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            status TEXT NOT NULL,
            error TEXT,
            metadata TEXT NOT NULL DEFAULT '{}'
        );

        CREATE TABLE IF NOT EXISTS admin_alerts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            alert_type TEXT NOT NULL,
            priority TEXT NOT NULL,
            summary TEXT NOT NULL,
            details TEXT NOT NULL DEFAULT '{}',
            status TEXT NOT NULL DEFAULT 'open',
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS system_alerts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            alert_type TEXT NOT NULL,
            message TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS skipped_payloads (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            reason TEXT NOT NULL,
            payload TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS bot_detections (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT,
            bot_probability REAL NOT NULL,
            signals TEXT NOT NULL,
            rejected INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS bot_detection_tests (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            label TEXT NOT NULL,
            user_agent TEXT,
            expected_probability REAL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS fake_referral_detections (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL,
            signals TEXT NOT NULL,
            rejected INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS audit_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            actor TEXT,
            action TEXT NOT NULL,
            details TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS access_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL,
            operation TEXT NOT NULL,
            granted INTEGER NOT NULL,
            reason TEXT,
            access_level TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS token_usage_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT,
            tokens_used INTEGER NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS user_api_costs (
            user_id TEXT PRIMARY KEY,
            total_cost_cents INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS system_configs (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_risk_flags_user ON user_risk_flags(user_id);
        CREATE INDEX IF NOT EXISTS idx_risk_flags_timestamp ON user_risk_flags(timestamp);
        CREATE INDEX IF NOT EXISTS idx_fingerprint_user ON fingerprint_data(user_id);
        CREATE INDEX IF NOT EXISTS idx_fingerprint_ip ON fingerprint_data(ip);
        CREATE INDEX IF NOT EXISTS idx_fingerprint_device ON fingerprint_data(device_hash);
        CREATE INDEX IF NOT EXISTS idx_fingerprint_event_type ON fingerprint_data(event_type);
        CREATE INDEX IF NOT EXISTS idx_fingerprint_timestamp ON fingerprint_data(timestamp);
        CREATE INDEX IF NOT EXISTS idx_anomalies_detected_at ON detected_anomalies(detected_at);
        CREATE INDEX IF NOT EXISTS idx_leaderboard_position ON leaderboard(position);
        CREATE INDEX IF NOT EXISTS idx_job_logs_name ON logs_scheduled_jobs(job_name);
        CREATE INDEX IF NOT EXISTS idx_access_logs_user ON access_logs(user_id);
        ",
    )
    .context("Failed to create database tables")?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [1],
    )?;

    Ok(())
}

/// Run a migration if it hasn't been applied yet. The migration function
/// receives the connection and should execute its SQL.
#[allow(dead_code)]
fn run_migration<F>(conn: &Connection, version: i64, migrate: F) -> Result<()>
where
    F: FnOnce(&Connection) -> rusqlite::Result<()>,
{
    let already_applied: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM schema_version WHERE version = ?1",
        [version],
        |row| row.get(0),
    )?;

    if !already_applied {
        migrate(conn).with_context(|| format!("Migration v{version} failed"))?;
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [version],
        )?;
    }

    Ok(())
}

/// Count the number of tables in the database (useful for init confirmation).
pub fn table_count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_tables_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        create_tables(&conn).unwrap();
    }

    #[test]
    fn test_table_count_matches_contract_table_list() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        let count = table_count(&conn).unwrap();
        // schema_version + the 20 persisted-state tables from the
        // external-interfaces contract.
        assert_eq!(count, 21);
    }
}
