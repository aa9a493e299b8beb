// SqliteDatabase — rusqlite backend implementing the Database trait.
//
// The Connection is wrapped in tokio::sync::Mutex because Connection is !Send.
// Trait methods lock the mutex, do synchronous rusqlite work, and return.
// The lock is never held across .await points — every call locks, runs a
// synchronous block of rusqlite calls, and drops the guard before returning.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tokio::sync::Mutex;

use crate::db::queries;
use crate::db::traits::Database;
use crate::model::{
    Alert, Anomaly, Challenge, FingerprintRecord, IngressStats, JobLog, LeaderboardEntry, RiskFlag,
    User,
};

pub struct SqliteDatabase {
    conn: Mutex<Connection>,
}

impl SqliteDatabase {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }
}

#[async_trait]
impl Database for SqliteDatabase {
    async fn table_count(&self) -> Result<i64> {
        let conn = self.conn.lock().await;
        crate::db::schema::table_count(&conn)
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        let conn = self.conn.lock().await;
        queries::get_user(&conn, user_id)
    }

    async fn upsert_user(&self, user: &User) -> Result<()> {
        let conn = self.conn.lock().await;
        queries::upsert_user(&conn, user)
    }

    async fn insert_risk_flag(&self, flag: &RiskFlag) -> Result<()> {
        let conn = self.conn.lock().await;
        queries::insert_risk_flag(&conn, flag)
    }

    async fn get_risk_flags_since(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<RiskFlag>> {
        let conn = self.conn.lock().await;
        queries::get_risk_flags_since(&conn, user_id, since)
    }

    async fn get_all_risk_flags_since(&self, since: DateTime<Utc>) -> Result<Vec<RiskFlag>> {
        let conn = self.conn.lock().await;
        queries::get_all_risk_flags_since(&conn, since)
    }

    async fn insert_fingerprint(&self, record: &FingerprintRecord) -> Result<()> {
        let conn = self.conn.lock().await;
        queries::insert_fingerprint(&conn, record)
    }

    async fn get_fingerprints_since(&self, since: DateTime<Utc>) -> Result<Vec<FingerprintRecord>> {
        let conn = self.conn.lock().await;
        queries::get_fingerprints_since(&conn, since)
    }

    async fn get_user_fingerprints_since(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<FingerprintRecord>> {
        let conn = self.conn.lock().await;
        queries::get_user_fingerprints_since(&conn, user_id, since, limit)
    }

    async fn insert_anomaly(&self, anomaly: &Anomaly) -> Result<()> {
        let conn = self.conn.lock().await;
        queries::insert_anomaly(&conn, anomaly)
    }

    async fn get_anomalies_since(&self, since: DateTime<Utc>) -> Result<Vec<Anomaly>> {
        let conn = self.conn.lock().await;
        queries::get_anomalies_since(&conn, since)
    }

    async fn replace_leaderboard(&self, entries: &[LeaderboardEntry]) -> Result<()> {
        let conn = self.conn.lock().await;
        queries::replace_leaderboard(&conn, entries)
    }

    async fn get_leaderboard(&self) -> Result<Vec<LeaderboardEntry>> {
        let conn = self.conn.lock().await;
        queries::get_leaderboard(&conn)
    }

    async fn archive_leaderboard_snapshot(&self, entries: &[LeaderboardEntry]) -> Result<()> {
        let conn = self.conn.lock().await;
        queries::archive_leaderboard_snapshot(&conn, entries)
    }

    async fn prune_leaderboard_archive(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let conn = self.conn.lock().await;
        queries::prune_leaderboard_archive(&conn, older_than)
    }

    async fn insert_challenge(&self, challenge: &Challenge) -> Result<()> {
        let conn = self.conn.lock().await;
        queries::insert_challenge(&conn, challenge)
    }

    async fn get_active_challenges(&self, now: DateTime<Utc>) -> Result<Vec<Challenge>> {
        let conn = self.conn.lock().await;
        queries::get_active_challenges(&conn, now)
    }

    async fn deactivate_expired_challenges(&self, now: DateTime<Utc>) -> Result<u64> {
        let conn = self.conn.lock().await;
        queries::deactivate_expired_challenges(&conn, now)
    }

    async fn get_all_users(&self) -> Result<Vec<User>> {
        let conn = self.conn.lock().await;
        queries::get_all_users(&conn)
    }

    async fn reset_weekly_scores(&self) -> Result<u64> {
        let conn = self.conn.lock().await;
        queries::reset_weekly_scores(&conn)
    }

    async fn insert_job_log(&self, log: &JobLog) -> Result<()> {
        let conn = self.conn.lock().await;
        queries::insert_job_log(&conn, log)
    }

    async fn get_last_job_log(&self, job_name: &str) -> Result<Option<JobLog>> {
        let conn = self.conn.lock().await;
        queries::get_last_job_log(&conn, job_name)
    }

    async fn insert_alert(&self, alert: &Alert) -> Result<()> {
        let conn = self.conn.lock().await;
        queries::insert_alert(&conn, alert)
    }

    async fn insert_access_log(
        &self,
        user_id: &str,
        operation: &str,
        granted: bool,
        reason: Option<&str>,
        access_level: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        queries::insert_access_log(&conn, user_id, operation, granted, reason, access_level)
    }

    async fn insert_bot_detection(
        &self,
        user_id: Option<&str>,
        bot_probability: f64,
        signals: &[String],
        rejected: bool,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        queries::insert_bot_detection(&conn, user_id, bot_probability, signals, rejected)
    }

    async fn insert_fake_referral_detection(
        &self,
        user_id: &str,
        signals: &[String],
        rejected: bool,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        queries::insert_fake_referral_detection(&conn, user_id, signals, rejected)
    }

    async fn insert_skipped_payload(
        &self,
        reason: &str,
        payload: &serde_json::Value,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        queries::insert_skipped_payload(&conn, reason, payload)
    }

    async fn insert_audit_log(
        &self,
        actor: Option<&str>,
        action: &str,
        details: &serde_json::Value,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        queries::insert_audit_log(&conn, actor, action, details)
    }

    async fn get_ingress_stats_since(&self, since: DateTime<Utc>) -> Result<IngressStats> {
        let conn = self.conn.lock().await;
        queries::get_ingress_stats_since(&conn, since)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::create_tables;

    fn setup_db() -> SqliteDatabase {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        SqliteDatabase::new(conn)
    }

    #[tokio::test]
    async fn test_upsert_and_get_user_via_trait() {
        let db = setup_db();
        let user = User {
            id: "u1".into(),
            ..Default::default()
        };
        db.upsert_user(&user).await.unwrap();
        let fetched = db.get_user("u1").await.unwrap().unwrap();
        assert_eq!(fetched.id, "u1");
    }

    #[tokio::test]
    async fn test_table_count_via_trait() {
        let db = setup_db();
        assert_eq!(db.table_count().await.unwrap(), 21);
    }
}
