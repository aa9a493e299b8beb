// End-to-end ingress webhook tests — drives the real axum router with an
// in-memory SQLite database via `tower::ServiceExt::oneshot`, the same
// in-process request-without-a-socket pattern the teacher's web tests use.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use rusqlite::Connection;
use sentrygate::config::{Config, WebhookAuthMethod};
use sentrygate::crypto;
use sentrygate::db::sqlite::SqliteDatabase;
use sentrygate::db::Database;
use sentrygate::ingress::{self, IngressState};
use tower::ServiceExt;

fn test_config(secret: &str) -> Config {
    test_config_with_bot_detection(secret, false)
}

fn test_config_with_bot_detection(secret: &str, bot_detection_enabled: bool) -> Config {
    Config {
        database_url: String::new(),
        db_path: String::new(),
        webhook_secret: secret.to_string(),
        webhook_bearer_token: String::new(),
        token_encryption_key: String::new(),
        webhook_auth_method: WebhookAuthMethod::Signature,
        webhook_max_retries: 1,
        webhook_timeout_secs: 1,
        webhook_exponential_backoff: false,
        bot_detection_enabled,
        min_behavior_score: 60.0,
        dashboard_refresh_seconds: 30,
        fake_referral_grace_hours: 24,
        bse_webhook_url: String::new(),
    }
}

fn test_state(secret: &str) -> IngressState {
    test_state_with_config(test_config(secret))
}

fn test_state_with_config(config: Config) -> IngressState {
    let conn = Connection::open_in_memory().unwrap();
    sentrygate::db::schema::create_tables(&conn).unwrap();
    let db: Arc<dyn Database> = Arc::new(SqliteDatabase::new(conn));
    IngressState::new(db, Arc::new(config))
}

fn signed_request(uri: &str, secret: &str, body: &str) -> Request<Body> {
    let signature = crypto::hmac_sign(secret, body);
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-webhook-signature", format!("sha256={signature}"))
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn with_connect_info(mut req: Request<Body>) -> Request<Body> {
    let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
    req.extensions_mut().insert(axum::extract::ConnectInfo(addr));
    req
}

#[tokio::test]
async fn valid_signed_login_event_returns_success_and_persists_user() {
    let secret = "topsecret";
    let state = test_state(secret);
    let db = state.db.clone();
    let app = ingress::routes().with_state(state);

    let body = r#"{"user_id":"webhook_u1","event_type":"login","source_ip":"1.2.3.4","user_agent":"chrome"}"#;
    let req = with_connect_info(signed_request("/webhook", secret, body));

    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["status"], "success");
    assert_eq!(json["user_id"], "webhook_u1");

    let user = db.get_user("webhook_u1").await.unwrap().unwrap();
    assert!(user.behavior_score > 0.0);
}

#[tokio::test]
async fn missing_signature_is_rejected_with_missing_auth() {
    let secret = "topsecret";
    let state = test_state(secret);
    let app = ingress::routes().with_state(state);

    let body = r#"{"user_id":"webhook_u2","event_type":"login"}"#;
    let req = with_connect_info(
        Request::builder()
            .method("POST")
            .uri("/webhook")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    );

    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn bot_keyword_in_real_user_agent_header_is_rejected_even_without_body_field() {
    let secret = "topsecret";
    let state = test_state_with_config(test_config_with_bot_detection(secret, true));
    let app = ingress::routes().with_state(state);

    // No `user_agent` in the JSON body at all — only the real header.
    let body = r#"{"user_id":"webhook_bot","event_type":"login","device_fingerprint_id":"fp1"}"#;
    let signature = crypto::hmac_sign(secret, body);
    let req = with_connect_info(
        Request::builder()
            .method("POST")
            .uri("/webhook")
            .header("content-type", "application/json")
            .header("x-webhook-signature", format!("sha256={signature}"))
            .header("user-agent", "Googlebot/2.1")
            .body(Body::from(body.to_string()))
            .unwrap(),
    );

    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn resubmitting_within_duplicate_window_is_a_no_op() {
    let secret = "topsecret";
    let state = test_state(secret);
    let app = ingress::routes().with_state(state);

    let body = r#"{"user_id":"webhook_u3","event_type":"login","source_ip":"1.2.3.4","user_agent":"chrome"}"#;

    let first = app.clone().oneshot(with_connect_info(signed_request("/webhook", secret, body))).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app.oneshot(with_connect_info(signed_request("/webhook", secret, body))).await.unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    let bytes = to_bytes(second.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["status"], "duplicate");
}

#[tokio::test]
async fn stats_endpoint_counts_the_processed_event() {
    let secret = "topsecret";
    let state = test_state(secret);
    let app = ingress::routes().with_state(state);

    let body = r#"{"user_id":"webhook_stats","event_type":"login","user_agent":"chrome"}"#;
    let ingest = app.clone().oneshot(with_connect_info(signed_request("/webhook", secret, body))).await.unwrap();
    assert_eq!(ingest.status(), StatusCode::OK);

    let req = with_connect_info(Request::builder().method("GET").uri("/webhook/stats").body(Body::empty()).unwrap());
    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["events_processed"], 1);
}

#[tokio::test]
async fn bot_detection_endpoint_flags_known_bot_user_agent() {
    let secret = "topsecret";
    let state = test_state(secret);
    let app = ingress::routes().with_state(state);

    let body = r#"{"user_agent":"python-requests/2.31"}"#;
    let req = with_connect_info(
        Request::builder()
            .method("POST")
            .uri("/webhook/bot-detection")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    );

    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert!(json["bot_probability"].as_f64().unwrap() > 0.0);
}
