//! Application-wide error type and HTTP mapping (§7).

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Error response body for every non-2xx JSON response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
    pub correlation_id: String,
    pub timestamp: String,
}

/// Upstream catalog provider failure kind (§4.1, §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamErrorKind {
    Timeout,
    Status,
    Parse,
}

impl std::fmt::Display for UpstreamErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::Status => write!(f, "status"),
            Self::Parse => write!(f, "parse"),
        }
    }
}

/// Failure of a single call to a named upstream catalog provider.
#[derive(Debug, Error, Clone)]
#[error("upstream '{provider}' failed ({kind})")]
pub struct UpstreamError {
    pub provider: String,
    pub kind: UpstreamErrorKind,
}

impl UpstreamError {
    pub fn new(provider: impl Into<String>, kind: UpstreamErrorKind) -> Self {
        Self { provider: provider.into(), kind }
    }
}

/// Application error type (§7). Kept deliberately small: the propagation policy for
/// each variant is decided at the call site, not baked into a wide enum of domain cases.
#[derive(Debug, Error)]
pub enum AppError {
    /// Missing/malformed query parameter or body field. No retry.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Missing/invalid bearer token.
    #[error("unauthorized")]
    Unauthorized,

    /// Requested resource does not exist (e.g. preferences absent for a user).
    #[error("not found: {0}")]
    NotFound(String),

    /// All providers failed for a mandatory step. Individual `UpstreamError`s are
    /// logged and absorbed well before this point; this variant only surfaces when
    /// nothing could be recovered.
    #[error("upstream failure: {0}")]
    Upstream(#[from] UpstreamError),

    /// A derived-aggregate or primary activity-log write failed.
    #[error("store error: {0}")]
    Store(String),

    /// The personalized reranker failed; caller should fall back to the rule-scored list.
    #[error("ranker error: {0}")]
    Ranker(String),

    /// Malformed request body.
    #[error("invalid request body")]
    JsonRejection(#[from] JsonRejection),

    /// Catch-all for unexpected internal failures.
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidInput(_) | AppError::JsonRejection(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Upstream(_) | AppError::Store(_) | AppError::Ranker(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::InvalidInput(_) => "INVALID_INPUT",
            AppError::Unauthorized => "UNAUTHORIZED",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Upstream(_) => "UPSTREAM_ERROR",
            AppError::Store(_) => "STORE_ERROR",
            AppError::Ranker(_) => "RANKER_ERROR",
            AppError::JsonRejection(_) => "INVALID_REQUEST_BODY",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            AppError::InvalidInput(msg) => msg.clone(),
            AppError::Unauthorized => "Authentication required".to_string(),
            AppError::NotFound(resource) => format!("{resource} not found"),
            AppError::Upstream(_) => "The catalog service is temporarily unavailable".to_string(),
            AppError::Store(_) => "Failed to save your data, please try again".to_string(),
            AppError::Ranker(_) => "Personalization is temporarily degraded".to_string(),
            AppError::JsonRejection(rej) => rej.body_text(),
            AppError::Internal(_) => "An unexpected error occurred".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let correlation_id = Uuid::new_v4().to_string();
        let status = self.status_code();
        let error_code = self.error_code();
        let user_message = self.user_message();

        match &self {
            AppError::Upstream(_) | AppError::Store(_) | AppError::Ranker(_) | AppError::Internal(_) => {
                tracing::error!(correlation_id = %correlation_id, error_code, error = %self, "request failed");
            }
            _ => {
                tracing::info!(correlation_id = %correlation_id, error_code, error = %self, "client error");
            }
        }

        let body = ErrorResponse {
            error: self.to_string(),
            error_code: error_code.to_string(),
            message: user_message,
            details: None,
            correlation_id,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
