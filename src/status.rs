// System status display — shows DB stats, user counts, last job runs,
// and open anomalies. Used by `sentrygate status` and by the `init`
// command's post-setup summary.

use anyhow::Result;
use std::path::Path;

use crate::db;
use crate::model::{AnomalyStatus, JobStatus, RiskLevel};

/// Display system status to the terminal.
pub fn show(config: &impl HasDbPath) -> Result<()> {
    let db_path = config.db_path();

    if !Path::new(db_path).exists() {
        println!("Database: not initialized");
        println!("\nRun `sentrygate init` to set up the database.");
        return Ok(());
    }

    let conn = db::open(db_path)?;

    let file_size = std::fs::metadata(db_path)
        .map(|m| format_bytes(m.len()))
        .unwrap_or_else(|_| "unknown".to_string());
    println!("Database: {} ({})", db_path, file_size);

    let users = db::queries::get_all_users(&conn)?;
    let mut suspicious = 0u32;
    let mut normal = 0u32;
    let mut highly_trusted = 0u32;
    for user in &users {
        match RiskLevel::from_score(user.behavior_score) {
            RiskLevel::Suspicious => suspicious += 1,
            RiskLevel::Normal => normal += 1,
            RiskLevel::HighlyTrusted => highly_trusted += 1,
        }
    }
    println!(
        "Users: {} total ({} suspicious, {} normal, {} highly trusted)",
        users.len(),
        suspicious,
        normal,
        highly_trusted
    );

    let now = chrono::Utc::now();
    let since = now - chrono::Duration::hours(24);
    let anomalies = db::queries::get_anomalies_since(&conn, since)?;
    let open_anomalies = anomalies.iter().filter(|a| a.status == AnomalyStatus::Open).count();
    println!("Anomalies (24h): {} total, {} open", anomalies.len(), open_anomalies);

    for job_name in ["daily_bse_recalculation", "weekly_challenges_and_reset", "hourly_flagged_user_detection"] {
        match db::queries::get_last_job_log(&conn, job_name)? {
            Some(log) => {
                let status = match log.status {
                    JobStatus::Success => "ok",
                    JobStatus::Failed => "FAILED",
                    JobStatus::SkippedOverlap => "skipped (overlap)",
                };
                println!("  {}: {} ({})", job_name, status, log.timestamp);
            }
            None => println!("  {}: never run", job_name),
        }
    }

    let leaderboard = db::queries::get_leaderboard(&conn)?;
    println!("Leaderboard: {} entries", leaderboard.len());

    Ok(())
}

/// Trait so both the binary's Config and tests can call show().
pub trait HasDbPath {
    fn db_path(&self) -> &str;
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
