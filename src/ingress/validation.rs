// Inbound payload shape and validation (§4.4 "Payload validation").
// Validation errors accumulate rather than short-circuiting, matching
// the response contract (`VALIDATION_ERROR` carries the full list).

use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    pub user_id: Option<String>,
    pub behavior_score: Option<f64>,
    #[serde(default)]
    pub risk_flags: Option<Vec<String>>,
    pub timestamp: Option<String>,
    pub event_type: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub source_ip: Option<String>,
    pub user_agent: Option<String>,
    pub device_fingerprint_id: Option<String>,
    /// Client-collected device attributes, used only as `device_hash`
    /// inputs (§ device fingerprinting) alongside the real ip/user_agent;
    /// cannot be derived server-side.
    pub screen_resolution: Option<String>,
    pub timezone: Option<String>,
    pub language: Option<String>,
    pub platform: Option<String>,
    pub canvas_fp: Option<String>,
    pub webgl_fp: Option<String>,
}

pub struct ValidatedPayload {
    pub user_id: String,
    pub behavior_score: Option<f64>,
    pub risk_flags: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Validates `payload`, accumulating every error found rather than
/// stopping at the first one.
pub fn validate(payload: &WebhookPayload, now: DateTime<Utc>) -> Result<ValidatedPayload, Vec<String>> {
    let mut errors = Vec::new();

    let user_id = match &payload.user_id {
        Some(id) if !id.is_empty() => Some(id.clone()),
        _ => {
            errors.push("user_id is required and must be a non-empty string".to_string());
            None
        }
    };

    if let Some(score) = payload.behavior_score {
        if !(0.0..=100.0).contains(&score) {
            errors.push("behavior_score must be between 0 and 100".to_string());
        }
    }

    let risk_flags = payload.risk_flags.clone().unwrap_or_default();
    if risk_flags.len() > 20 {
        errors.push("risk_flags may contain at most 20 entries".to_string());
    }

    let timestamp = match &payload.timestamp {
        None => Some(now),
        Some(raw) => match DateTime::parse_from_rfc3339(raw) {
            Ok(dt) => Some(dt.with_timezone(&Utc)),
            Err(_) => {
                errors.push("timestamp must be an ISO-8601 string".to_string());
                None
            }
        },
    };

    match (user_id, timestamp) {
        (Some(user_id), Some(timestamp)) if errors.is_empty() => Ok(ValidatedPayload {
            user_id,
            behavior_score: payload.behavior_score,
            risk_flags,
            timestamp,
        }),
        _ => Err(errors),
    }
}
