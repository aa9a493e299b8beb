// Dashboard API (§6 "Dashboard endpoints"). Read-only aggregation over
// the same `Database` trait ingress writes through, plus a periodic SSE
// push so operators don't have to poll. No auth gate — spec.md doesn't
// mandate one for dashboard reads (see DESIGN.md Open Questions).

pub mod charts;
pub mod stream;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use tokio::sync::broadcast;

use crate::config::Config;
use crate::db::Database;

/// Shared state for the dashboard's own router group. Kept separate
/// from `ingress::IngressState` since the two surfaces have unrelated
/// auth and don't need to share a state type, mirroring how the teacher
/// keeps `web::AppState` as the single state for its whole router.
#[derive(Clone)]
pub struct DashboardState {
    pub db: Arc<dyn Database>,
    pub config: Arc<Config>,
    pub updates: broadcast::Sender<serde_json::Value>,
}

impl DashboardState {
    pub fn new(db: Arc<dyn Database>, config: Arc<Config>) -> Self {
        let (updates, _) = broadcast::channel(64);
        Self { db, config, updates }
    }

    /// Spawn the background task that pushes a `dashboard_update` event
    /// to all connected SSE clients every `dashboard_refresh_seconds`.
    pub fn spawn_refresh_task(&self) {
        let db = self.db.clone();
        let updates = self.updates.clone();
        let interval_secs = self.config.dashboard_refresh_seconds.max(1);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
            loop {
                ticker.tick().await;
                if updates.receiver_count() == 0 {
                    continue;
                }
                match charts::build_summary(db.as_ref(), charts::TimeRange::Day).await {
                    Ok(summary) => {
                        let _ = updates.send(serde_json::json!({
                            "event": "dashboard_update",
                            "summary": summary,
                        }));
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "dashboard refresh tick failed");
                    }
                }
            }
        });
    }
}

pub fn routes() -> Router<DashboardState> {
    Router::new()
        .route("/api/dashboard/data", get(get_dashboard_data))
        .route("/api/dashboard/metrics", get(get_dashboard_metrics))
        .route("/api/dashboard/stream", get(stream::dashboard_stream))
}

#[derive(Debug, Deserialize)]
pub struct TimeRangeQuery {
    pub time_range: Option<String>,
}

async fn get_dashboard_data(
    State(state): State<DashboardState>,
    Query(params): Query<TimeRangeQuery>,
) -> impl IntoResponse {
    let range = charts::TimeRange::parse(params.time_range.as_deref());

    match charts::build_dashboard_data(state.db.as_ref(), range).await {
        Ok(data) => Json(data).into_response(),
        Err(err) => crate::errors::ApiError::from_database(&err).into_response(),
    }
}

async fn get_dashboard_metrics(State(state): State<DashboardState>) -> impl IntoResponse {
    match charts::build_summary(state.db.as_ref(), charts::TimeRange::Day).await {
        Ok(summary) => Json(summary).into_response(),
        Err(err) => crate::errors::ApiError::from_database(&err).into_response(),
    }
}
