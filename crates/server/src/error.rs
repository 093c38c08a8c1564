use axum::Json;
use axum::response::{IntoResponse, Response};
use hyper::StatusCode;
use sea_orm::DbErr;
use thiserror::Error;

/// Failures of the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Db(#[from] DbErr),
    #[error("{0} not found")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
}

/// Failures that abort a single check pipeline invocation.
///
/// Probe failures are never represented here; an unreachable endpoint is a
/// valid outcome, not a job failure.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Failed to persist check data: {0}")]
    Persistence(#[from] StoreError),
}

impl PipelineError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, PipelineError::Persistence(StoreError::Db(_)))
    }
}

/// Failures of a single notification channel.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },
    #[error("Failed to build email: {0}")]
    EmailBuild(String),
    #[error("SMTP error: {0}")]
    Smtp(String),
    #[error("Email transport is not configured")]
    EmailDisabled,
    #[error("Webhook request failed: {0}")]
    Webhook(String),
    #[error("Webhook returned HTTP {0}")]
    WebhookStatus(StatusCode),
}

/// Errors returned by HTTP handlers, rendered as `{"error": "..."}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Database error: {0}")]
    Database(String),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => ApiError::NotFound(format!("{what} not found")),
            StoreError::Conflict(msg) => ApiError::Conflict(msg),
            StoreError::Db(e) => ApiError::Database(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(
                name = "api.error",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                error = %self,
                message = "Request failed"
            );
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
