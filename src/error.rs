//! Crate-wide error taxonomy.
//!
//! Every failure surfaced across module boundaries collapses into one of
//! these variants so the HTTP layer has a single place to map errors onto
//! status codes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64, limit: u32, remaining: u32 },

    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("dependency unavailable: {0}")]
    Unavailable(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn status(&self) -> StatusCode {
        match self {
            CoreError::Validation(_) => StatusCode::BAD_REQUEST,
            CoreError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            CoreError::Forbidden(_) => StatusCode::FORBIDDEN,
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::Conflict(_) => StatusCode::CONFLICT,
            CoreError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            CoreError::QuotaExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            CoreError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            CoreError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            CoreError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = self.to_string();

        if let CoreError::Internal(ref msg) = self {
            tracing::error!(error = %msg, "internal error");
        }

        let mut response = (status, Json(json!({ "detail": detail }))).into_response();

        if let CoreError::RateLimited { retry_after_secs, limit, remaining } = self {
            let headers = response.headers_mut();
            headers.insert("Retry-After", retry_after_secs.into());
            headers.insert(
                "X-RateLimit-Limit",
                limit.to_string().parse().expect("digits are valid header value"),
            );
            headers.insert(
                "X-RateLimit-Remaining",
                remaining.to_string().parse().expect("digits are valid header value"),
            );
        }

        response
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            // Connection-level contention: another writer holds the lock.
            // Surfaced as retryable so callers can back off and retry
            // instead of failing the whole request outright.
            rusqlite::Error::SqliteFailure(err, _)
                if matches!(
                    err.code,
                    rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
                ) =>
            {
                CoreError::Unavailable(format!("sqlite busy: {e}"))
            }
            // A real constraint violation is fatal, not transient — retrying
            // would just fail again.
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                CoreError::Conflict(format!("sqlite constraint violation: {e}"))
            }
            _ => CoreError::Internal(format!("sqlite: {e}")),
        }
    }
}

/// Retry a fallible graph-store operation up to [`MAX_RETRIES`] times with
/// exponential backoff, but only for the [`CoreError::Unavailable`] branch
/// (sqlite busy/locked, pool exhaustion, Redis hiccups) — any other error
/// surfaces immediately. Exhausting the cap re-surfaces `Unavailable` (503)
/// rather than escalating to `Internal`.
pub async fn retry_transient<F, Fut, T>(mut op: F) -> CoreResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = CoreResult<T>>,
{
    const MAX_RETRIES: u32 = 3;
    const BASE_DELAY_MS: u64 = 20;

    let mut attempt = 0;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(CoreError::Unavailable(msg)) => {
                attempt += 1;
                if attempt > MAX_RETRIES {
                    return Err(CoreError::Unavailable(format!(
                        "still unavailable after {MAX_RETRIES} retries: {msg}"
                    )));
                }
                let delay_ms = BASE_DELAY_MS * 2u64.pow(attempt - 1);
                tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

impl From<r2d2::Error> for CoreError {
    fn from(e: r2d2::Error) -> Self {
        CoreError::Unavailable(format!("graph store pool exhausted: {e}"))
    }
}

impl From<redis::RedisError> for CoreError {
    fn from(e: redis::RedisError) -> Self {
        CoreError::Unavailable(format!("redis: {e}"))
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Internal(format!("serialization: {e}"))
    }
}
