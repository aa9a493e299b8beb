// Ingress webhook (§4.4) — authenticate, rate-limit, pre-filter,
// validate, persist, score, and respond. Axum router + `IngressState`
// threaded through handlers, the same `AppState`-through-handlers idiom
// as the teacher's `web::AppState`.

pub mod auth;
pub mod filters;
pub mod rate_limit;
pub mod validation;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, State};
use axum::http::header::USER_AGENT;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{Duration, Utc};
use tracing::warn;

use crate::bse::forwarder::BseForwarder;
use crate::bse::{self, UserContext};
use crate::config::Config;
use crate::crypto;
use crate::db::Database;
use crate::errors::ApiError;
use crate::maf::patterns::PatternDetector;
use crate::model::{Event, EventType, FingerprintRecord};

/// Real connection identity: the client-supplied JSON body is never
/// trusted for `ip`/`user_agent`, only for the device attributes that
/// have no server-side source (screen, timezone, canvas/webgl fp, ...).
fn real_ip(addr: SocketAddr, headers: &HeaderMap) -> String {
    let pairs: Vec<(&str, &str)> = headers
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v)))
        .collect();
    crate::maf::extract_ip_address(&pairs).unwrap_or_else(|| addr.ip().to_string())
}

fn real_user_agent(headers: &HeaderMap) -> String {
    headers.get(USER_AGENT).and_then(|v| v.to_str().ok()).unwrap_or("").to_string()
}

const RECENT_ACTIVITY_LIMIT: u32 = 200;
const DUPLICATE_WINDOW_SECS: i64 = 60;

#[derive(Clone)]
pub struct IngressState {
    pub db: Arc<dyn Database>,
    pub config: Arc<Config>,
    pub webhook_limiter: rate_limit::RateLimiter,
    pub bot_detection_limiter: rate_limit::RateLimiter,
    pub pattern_bank: Arc<Vec<Box<dyn PatternDetector>>>,
    pub forwarder: Arc<BseForwarder>,
}

impl IngressState {
    pub fn new(db: Arc<dyn Database>, config: Arc<Config>) -> Self {
        let forwarder = BseForwarder::new(
            config.bse_webhook_url.clone(),
            config.webhook_timeout_secs,
            config.webhook_max_retries,
            config.webhook_exponential_backoff,
        );
        Self {
            db,
            config,
            webhook_limiter: rate_limit::RateLimiter::per_hour(100),
            bot_detection_limiter: rate_limit::RateLimiter::per_hour(20),
            pattern_bank: Arc::new(crate::maf::patterns::default_bank()),
            forwarder: Arc::new(forwarder),
        }
    }
}

pub fn routes() -> Router<IngressState> {
    Router::new()
        .route("/webhook", post(handle_webhook))
        .route("/webhook/bot-detection", post(handle_bot_detection))
        .route("/webhook/stats", get(handle_stats))
}

fn parse_event_type(raw: Option<&str>) -> EventType {
    match raw.unwrap_or("") {
        "signup" => EventType::Signup,
        "referral" => EventType::Referral,
        "meme_upload" => EventType::MemeUpload,
        "social_interaction" => EventType::SocialInteraction,
        "form_submission" => EventType::FormSubmission,
        "wallet_connection" => EventType::WalletConnection,
        "nft_listing" => EventType::NftListing,
        "click" => EventType::Click,
        "page_view" => EventType::PageView,
        _ => EventType::Login,
    }
}

async fn handle_webhook(
    State(state): State<IngressState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    let started = Instant::now();

    auth::authenticate(&state.config, &headers, &body)?;

    let ip = real_ip(addr, &headers);
    let user_agent = real_user_agent(&headers);

    if !state.webhook_limiter.check(&addr.ip().to_string()).await {
        return Err(ApiError::RateLimitExceeded);
    }

    let payload: validation::WebhookPayload = serde_json::from_slice(&body).map_err(|_| ApiError::InvalidPayload)?;

    if state.config.bot_detection_enabled {
        let has_fingerprint = payload.device_fingerprint_id.is_some();
        let bot_signal = filters::detect_bot(Some(user_agent.as_str()), has_fingerprint);
        let rejected = filters::should_reject_bot(&bot_signal);
        let _ = state
            .db
            .insert_bot_detection(payload.user_id.as_deref(), bot_signal.probability, &to_strings(&bot_signal.signals), rejected)
            .await;
        if rejected {
            return Err(ApiError::BotDetected(bot_signal.signals.iter().map(|s| s.to_string()).collect()));
        }
    }

    let now = Utc::now();
    let validated = match validation::validate(&payload, now) {
        Ok(v) => v,
        Err(errors) => {
            let _ = state.db.insert_skipped_payload("validation_error", &serde_json::json!({"errors": errors})).await;
            return Err(ApiError::ValidationError(errors));
        }
    };

    let event_type = parse_event_type(payload.event_type.as_deref());

    if event_type == EventType::Referral {
        let signals = filters::detect_fake_referral(state.db.as_ref(), &validated.user_id, Some(ip.as_str()), now)
            .await
            .map_err(|e| ApiError::from_database(&e))?;
        let rejected = !signals.is_empty();
        let _ = state
            .db
            .insert_fake_referral_detection(&validated.user_id, &to_strings(&signals), rejected)
            .await;
        if rejected {
            return Err(ApiError::FakeReferralDetected(signals.iter().map(|s| s.to_string()).collect()));
        }
    }

    let existing_user = state.db.get_user(&validated.user_id).await.map_err(|e| ApiError::from_database(&e))?;

    if let Some(user) = &existing_user {
        if (validated.timestamp - user.last_updated).num_seconds().abs() < DUPLICATE_WINDOW_SECS {
            return Ok(Json(serde_json::json!({ "status": "duplicate" })));
        }
    }

    let account_age_days = existing_user
        .as_ref()
        .map(|u| (now - u.created_at).num_days().max(0))
        .unwrap_or(0);
    let recent_activity = state
        .db
        .get_user_fingerprints_since(&validated.user_id, now - Duration::hours(24), RECENT_ACTIVITY_LIMIT)
        .await
        .map_err(|e| ApiError::from_database(&e))?;

    let ctx = UserContext {
        account_age_days,
        current_score: existing_user.as_ref().map(|u| u.behavior_score).unwrap_or(100.0),
        is_verified: existing_user.as_ref().map(|u| u.is_verified).unwrap_or(false),
        recent_activity,
    };

    let event = Event {
        user_id: validated.user_id.clone(),
        event_type,
        timestamp: validated.timestamp,
        metadata: payload.metadata.clone(),
        source_ip: Some(ip.clone()),
        user_agent: Some(user_agent.clone()),
        device_fingerprint_id: payload.device_fingerprint_id.clone(),
    };

    let outcome = bse::compute(&event, &ctx);

    let mut user = existing_user.unwrap_or_default();
    user.id = validated.user_id.clone();
    user.behavior_score = outcome.score;
    user.last_updated = now;
    state.db.upsert_user(&user).await.map_err(|e| ApiError::from_database(&e))?;

    for flag in &outcome.risk_flags {
        if let Err(err) = state.db.insert_risk_flag(flag).await {
            warn!(error = %err, "failed to persist risk flag");
        }
    }

    let device_hash = crypto::device_hash(
        &ip,
        &user_agent,
        payload.screen_resolution.as_deref().unwrap_or(""),
        payload.timezone.as_deref().unwrap_or(""),
        payload.language.as_deref().unwrap_or(""),
        payload.platform.as_deref().unwrap_or(""),
        payload.canvas_fp.as_deref().unwrap_or(""),
        payload.webgl_fp.as_deref().unwrap_or(""),
    );
    let record = FingerprintRecord {
        user_id: validated.user_id.clone(),
        event_type,
        ip,
        user_agent,
        device_hash,
        timestamp: validated.timestamp,
        confidence: 0.8,
        geo: None,
        browser_details: Some(payload.metadata.clone()),
    };
    if let Err(err) = state.db.insert_fingerprint(&record).await {
        warn!(error = %err, "failed to persist fingerprint record");
    }

    let window = state.db.get_fingerprints_since(now - Duration::hours(24)).await.unwrap_or_default();
    let anomalies = crate::maf::run_bank(&state.pattern_bank, &window, now);
    for anomaly in &anomalies {
        if let Err(err) = state.db.insert_anomaly(anomaly).await {
            warn!(error = %err, "failed to persist anomaly");
        }
    }

    let forwarded_flags: Vec<String> = outcome.risk_flags.iter().map(|f| f.flag.clone()).collect();
    if let Err(err) = state.forwarder.forward(&validated.user_id, outcome.score, &forwarded_flags, now).await {
        warn!(error = %err, "bse forward failed");
    }

    Ok(Json(serde_json::json!({
        "status": "success",
        "user_id": validated.user_id,
        "score": outcome.score,
        "flags_count": outcome.risk_flags.len(),
        "processed_at": now.to_rfc3339(),
        "processing_time_seconds": started.elapsed().as_secs_f64(),
    })))
}

async fn handle_bot_detection(
    State(state): State<IngressState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(payload): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !state.bot_detection_limiter.check(&addr.ip().to_string()).await {
        return Err(ApiError::RateLimitExceeded);
    }

    let user_agent = payload.get("user_agent").and_then(|v| v.as_str());
    let has_fingerprint = payload.get("device_fingerprint_id").and_then(|v| v.as_str()).is_some();
    let signal = filters::detect_bot(user_agent, has_fingerprint);
    let rejected = filters::should_reject_bot(&signal);

    let user_id = payload.get("user_id").and_then(|v| v.as_str());
    let _ = state
        .db
        .insert_bot_detection(user_id, signal.probability, &to_strings(&signal.signals), rejected)
        .await;

    Ok(Json(serde_json::json!({
        "bot_probability": signal.probability,
        "signals": signal.signals,
        "rejected": rejected,
    })))
}

/// Aggregate ingress counters over the trailing 24h.
async fn handle_stats(State(state): State<IngressState>) -> Result<Json<serde_json::Value>, ApiError> {
    let since = Utc::now() - Duration::hours(24);
    let stats = state.db.get_ingress_stats_since(since).await.map_err(|e| ApiError::from_database(&e))?;
    Ok(Json(serde_json::json!({
        "window_hours": 24,
        "events_processed": stats.events_processed,
        "risk_flags_raised": stats.risk_flags_raised,
        "anomalies_detected": stats.anomalies_detected,
        "bot_detections": {
            "total": stats.bot_detections_total,
            "rejected": stats.bot_detections_rejected,
        },
        "fake_referral_detections": {
            "total": stats.fake_referral_detections_total,
            "rejected": stats.fake_referral_detections_rejected,
        },
    })))
}

fn to_strings(signals: &[&'static str]) -> Vec<String> {
    signals.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_event_type_defaults_to_login() {
        assert_eq!(parse_event_type(None), EventType::Login);
        assert_eq!(parse_event_type(Some("signup")), EventType::Signup);
        assert_eq!(parse_event_type(Some("nft_listing")), EventType::NftListing);
    }
}
