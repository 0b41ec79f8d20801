use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Verification service error variants (use-case surface).
#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    #[error("invalid email address")]
    InvalidEmail,
    #[error("invalid handle")]
    InvalidHandle,
    #[error("registration not found")]
    RegistrationNotFound,
    #[error("entropy source unavailable")]
    EntropyUnavailable,
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl VerificationError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidEmail => "INVALID_EMAIL",
            Self::InvalidHandle => "INVALID_HANDLE",
            Self::RegistrationNotFound => "REGISTRATION_NOT_FOUND",
            Self::EntropyUnavailable => "ENTROPY_UNAVAILABLE",
            Self::Internal(_) => "INTERNAL",
        }
    }
}

impl IntoResponse for VerificationError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::InvalidEmail | Self::InvalidHandle => StatusCode::BAD_REQUEST,
            Self::RegistrationNotFound => StatusCode::NOT_FOUND,
            Self::EntropyUnavailable | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        // Log 500s only — tower-http TraceLayer already records method/uri/status for all
        // requests. 4xx are expected client errors; logging them here would be noise.
        if let Self::Internal(ref e) = self {
            tracing::error!(error = %e, kind = "INTERNAL", "internal error");
        }
        let body = serde_json::json!({
            "kind": self.kind(),
            "message": self.to_string(),
        });
        (status, axum::Json(body)).into_response()
    }
}

/// Outcome of a single profile read. `NotFound` is permanent for the
/// registration; the other variants are transient and retried by the
/// matcher's backoff, never surfaced as a final failure on their own.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("profile not found")]
    NotFound,
    #[error("site unreachable: {0}")]
    Unreachable(String),
    #[error("rate limited by site")]
    RateLimited { retry_after: Option<Duration> },
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::NotFound)
    }
}

/// Outcome of a single mail send. All variants are retried by the
/// dispatcher within its bounded retry budget.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("mail transport unreachable: {0}")]
    Unreachable(String),
    #[error("mail send rejected (status {status})")]
    Rejected { status: u16 },
}

/// Code generation failure. Fatal to registration creation, never retried.
#[derive(Debug, thiserror::Error)]
pub enum CodeError {
    #[error("entropy source unavailable")]
    EntropySourceUnavailable,
}
