// Scheduled Operations Layer — a cooperative minute-resolution loop that
// fires three wall-clock-triggered jobs, grounded in the teacher's
// `web::scan_job::launch_scan`/`ScanStatus` shape (a spawned background
// task reporting through shared state) generalized from "one
// user-triggered scan" to "three scheduled jobs with overlap guards."
//
// No cron crate: the teacher never schedules anything itself, so a plain
// `tokio::time::interval` tick compared against each job's next-fire
// time is the idiomatic minimal fit.

pub mod jobs;

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Datelike, Timelike, Utc};
use tokio::sync::Mutex;
use tokio::time::{interval, Duration as TokioDuration};
use tracing::{info, warn};

use crate::db::Database;
use crate::model::{JobLog, JobStatus};
use crate::retry::BackoffConfig;

const TICK_INTERVAL_SECS: u64 = 60;

/// Tracks which jobs are currently in flight so a slow run doesn't
/// overlap with its own next scheduled firing.
#[derive(Default)]
pub struct InFlightGuard {
    running: Mutex<HashSet<&'static str>>,
}

impl InFlightGuard {
    async fn try_enter(&self, job_name: &'static str) -> bool {
        let mut running = self.running.lock().await;
        running.insert(job_name)
    }

    async fn leave(&self, job_name: &'static str) {
        self.running.lock().await.remove(job_name);
    }
}

fn is_daily_due(now: chrono::DateTime<Utc>) -> bool {
    now.hour() == 0 && now.minute() == 1
}

fn is_weekly_due(now: chrono::DateTime<Utc>) -> bool {
    now.weekday() == chrono::Weekday::Mon && now.hour() == 0 && now.minute() == 10
}

fn is_hourly_due(now: chrono::DateTime<Utc>) -> bool {
    now.minute() == 0
}

#[derive(Debug, Clone, Copy)]
enum JobKind {
    Daily,
    Weekly,
    Hourly,
}

impl JobKind {
    fn name(self) -> &'static str {
        match self {
            JobKind::Daily => "daily_bse_recalculation",
            JobKind::Weekly => "weekly_challenges_and_reset",
            JobKind::Hourly => "hourly_flagged_user_detection",
        }
    }
}

/// Runs forever, waking once a minute. Intended to be spawned as its own
/// tokio task from `main`.
pub async fn run_scheduler(db: Arc<dyn Database>, backoff: BackoffConfig) {
    let guard = Arc::new(InFlightGuard::default());
    let mut ticker = interval(TokioDuration::from_secs(TICK_INTERVAL_SECS));

    loop {
        ticker.tick().await;
        let now = Utc::now();

        if is_daily_due(now) {
            dispatch(db.clone(), guard.clone(), backoff, JobKind::Daily);
        }
        if is_weekly_due(now) {
            dispatch(db.clone(), guard.clone(), backoff, JobKind::Weekly);
        }
        if is_hourly_due(now) {
            dispatch(db.clone(), guard.clone(), backoff, JobKind::Hourly);
        }
    }
}

fn dispatch(db: Arc<dyn Database>, guard: Arc<InFlightGuard>, backoff: BackoffConfig, kind: JobKind) {
    let job_name = kind.name();
    tokio::spawn(async move {
        if !guard.try_enter(job_name).await {
            warn!(job_name, "previous run still in flight, skipping this firing");
            let skip = JobLog {
                job_name: job_name.to_string(),
                timestamp: Utc::now(),
                status: JobStatus::SkippedOverlap,
                error: None,
                metadata: serde_json::json!({}),
            };
            let _ = db.insert_job_log(&skip).await;
            return;
        }

        let result = match kind {
            JobKind::Daily => jobs::daily_bse_recalculation(db.as_ref(), backoff).await,
            JobKind::Weekly => jobs::weekly_challenges_and_reset(db.as_ref(), backoff).await,
            JobKind::Hourly => jobs::hourly_flagged_user_detection(db.as_ref(), backoff).await,
        };

        match result {
            Ok(log) => info!(job_name, status = ?log.status, "scheduled job finished"),
            Err(err) => warn!(job_name, error = %err, "scheduled job returned an error"),
        }

        guard.leave(job_name).await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_daily_due_window() {
        let due = Utc.with_ymd_and_hms(2026, 1, 5, 0, 1, 0).unwrap();
        let not_due = Utc.with_ymd_and_hms(2026, 1, 5, 0, 2, 0).unwrap();
        assert!(is_daily_due(due));
        assert!(!is_daily_due(not_due));
    }

    #[test]
    fn test_weekly_due_only_on_monday() {
        let monday = Utc.with_ymd_and_hms(2026, 1, 5, 0, 10, 0).unwrap();
        let tuesday = Utc.with_ymd_and_hms(2026, 1, 6, 0, 10, 0).unwrap();
        assert!(is_weekly_due(monday));
        assert!(!is_weekly_due(tuesday));
    }

    #[test]
    fn test_hourly_due_at_top_of_hour() {
        let top = Utc.with_ymd_and_hms(2026, 1, 5, 14, 0, 0).unwrap();
        let mid = Utc.with_ymd_and_hms(2026, 1, 5, 14, 30, 0).unwrap();
        assert!(is_hourly_due(top));
        assert!(!is_hourly_due(mid));
    }

    #[tokio::test]
    async fn test_in_flight_guard_rejects_reentry() {
        let guard = InFlightGuard::default();
        assert!(guard.try_enter("job").await);
        assert!(!guard.try_enter("job").await);
        guard.leave("job").await;
        assert!(guard.try_enter("job").await);
    }
}
