// The wire-stable error taxonomy for every HTTP-facing component
// (ingress, dashboard). Unlike the rest of the crate, which propagates
// `anyhow::Error` for internal fallible paths, this type crosses an
// external boundary with a fixed, enumerable shape — the right place to
// reach for `thiserror` instead.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("missing authentication")]
    MissingAuth,
    #[error("invalid authentication")]
    InvalidAuth,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("invalid content type")]
    InvalidContentType,
    #[error("invalid payload")]
    InvalidPayload,
    #[error("validation error")]
    ValidationError(Vec<String>),
    #[error("bot detected")]
    BotDetected(Vec<String>),
    #[error("fake referral detected")]
    FakeReferralDetected(Vec<String>),
    #[error("BSE processing error")]
    BseProcessingError,
    #[error("database connection error")]
    DatabaseConnectionError,
    #[error("database unavailable")]
    DatabaseUnavailable,
    #[error("database auth error")]
    DatabaseAuthError,
    #[error("database validation error")]
    DatabaseValidationError,
    #[error("database error")]
    DatabaseError,
    #[error("rate limit exceeded")]
    RateLimitExceeded,
    #[error("endpoint not found")]
    EndpointNotFound,
    #[error("method not allowed")]
    MethodNotAllowed,
    #[error("internal error")]
    InternalError,
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::MissingAuth => "MISSING_AUTH",
            ApiError::InvalidAuth => "INVALID_AUTH",
            ApiError::InvalidSignature => "INVALID_SIGNATURE",
            ApiError::InvalidContentType => "INVALID_CONTENT_TYPE",
            ApiError::InvalidPayload => "INVALID_PAYLOAD",
            ApiError::ValidationError(_) => "VALIDATION_ERROR",
            ApiError::BotDetected(_) => "BOT_DETECTED",
            ApiError::FakeReferralDetected(_) => "FAKE_REFERRAL_DETECTED",
            ApiError::BseProcessingError => "BSE_PROCESSING_ERROR",
            ApiError::DatabaseConnectionError => "DATABASE_CONNECTION_ERROR",
            ApiError::DatabaseUnavailable => "DATABASE_UNAVAILABLE",
            ApiError::DatabaseAuthError => "DATABASE_AUTH_ERROR",
            ApiError::DatabaseValidationError => "DATABASE_VALIDATION_ERROR",
            ApiError::DatabaseError => "DATABASE_ERROR",
            ApiError::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            ApiError::EndpointNotFound => "ENDPOINT_NOT_FOUND",
            ApiError::MethodNotAllowed => "METHOD_NOT_ALLOWED",
            ApiError::InternalError => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingAuth | ApiError::InvalidAuth | ApiError::InvalidSignature => {
                StatusCode::UNAUTHORIZED
            }
            ApiError::InvalidContentType
            | ApiError::InvalidPayload
            | ApiError::ValidationError(_)
            | ApiError::DatabaseValidationError => StatusCode::BAD_REQUEST,
            ApiError::BotDetected(_) | ApiError::FakeReferralDetected(_) => StatusCode::FORBIDDEN,
            ApiError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            ApiError::EndpointNotFound => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::DatabaseConnectionError
            | ApiError::DatabaseAuthError
            | ApiError::BseProcessingError => StatusCode::BAD_GATEWAY,
            ApiError::DatabaseUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::DatabaseError | ApiError::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn details(&self) -> Option<Vec<String>> {
        match self {
            ApiError::ValidationError(d)
            | ApiError::BotDetected(d)
            | ApiError::FakeReferralDetected(d) => Some(d.clone()),
            _ => None,
        }
    }

    /// Classify a store-layer failure into the wire taxonomy (§4.4).
    pub fn from_database(err: &anyhow::Error) -> Self {
        let msg = err.to_string().to_lowercase();
        if msg.contains("connection") || msg.contains("network") {
            ApiError::DatabaseConnectionError
        } else if msg.contains("unavailable") {
            ApiError::DatabaseUnavailable
        } else if msg.contains("auth") {
            ApiError::DatabaseAuthError
        } else if msg.contains("constraint") || msg.contains("validation") {
            ApiError::DatabaseValidationError
        } else {
            ApiError::DatabaseError
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    status: &'static str,
    error_code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Vec<String>>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            status: "error",
            error_code: self.code(),
            message: self.to_string(),
            details: self.details(),
        };
        (status, Json(body)).into_response()
    }
}
