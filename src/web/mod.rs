// Top-level HTTP composition — merges the ingress webhook surface and
// the dashboard JSON/SSE surface into one Axum server, mirroring the
// teacher's own `web::build_router` merge-of-sub-routers shape (here
// there's no bundled SPA to serve, so no fallback route).

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::State;
use axum::http::{header, Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Config;
use crate::dashboard::{self, DashboardState};
use crate::db::Database;
use crate::ingress::{self, IngressState};

/// Start the Axum server (ingress + dashboard) and block until it exits.
pub async fn run_server(config: Config, db: Arc<dyn Database>, port: u16, bind: &str) -> Result<()> {
    let config = Arc::new(config);

    let dashboard_state = DashboardState::new(db.clone(), config.clone());
    dashboard_state.spawn_refresh_task();

    let ingress_state = IngressState::new(db, config);

    let app = build_router(ingress_state, dashboard_state);

    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    info!("sentrygate listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}

fn build_router(ingress_state: IngressState, dashboard_state: DashboardState) -> Router {
    let health_state = ingress_state.clone();
    let ingress_router = ingress::routes().with_state(ingress_state);
    let dashboard_router = dashboard::routes().with_state(dashboard_state);

    Router::new()
        .route("/health", get(health))
        .with_state(health_state)
        .merge(ingress_router)
        .merge(dashboard_router)
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]),
        )
        .layer(TraceLayer::new_for_http())
}

/// Health check — reports DB connectivity, configured auth method, and
/// which core detection features are enabled.
async fn health(State(state): State<IngressState>) -> impl IntoResponse {
    let database_ok = state.db.table_count().await.is_ok();

    (
        StatusCode::OK,
        axum::Json(serde_json::json!({
            "status": if database_ok { "ok" } else { "degraded" },
            "database": if database_ok { "connected" } else { "unavailable" },
            "auth_method": state.config.webhook_auth_method.as_str(),
            "features": {
                "bot_detection": state.config.bot_detection_enabled,
                "bse": true,
                "fake_referral_detection": true,
            },
        })),
    )
}
