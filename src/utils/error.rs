use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// API Error with rich context and automatic error trait implementations
///
/// Design: Uses thiserror for ergonomic error handling with context.
/// Each variant carries meaningful context to help with debugging.
#[derive(Error, Debug)]
pub enum ApiError {
    // Upstream dataset errors 2xxx
    #[error("Dataset '{dataset}' unavailable: {message}")]
    DatasetUnavailable { dataset: String, message: String },

    #[error("Dataset '{dataset}' authentication failed")]
    DatasetAuthFailed { dataset: String },

    #[error("Precipitation service error: {0}")]
    PrecipService(String),

    // Validation errors 4xxx
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid cell index: {0}")]
    InvalidCellIndex(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // System errors 5xxx
    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Risk computation failed for cell {cell}: {message}")]
    RiskComputation { cell: String, message: String },

    // Generic wrapper for other errors - auto-convert from anyhow::Error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ApiError {
    /// Helper to create validation error
    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::ValidationError(message.into())
    }

    /// Helper to create invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Helper to create internal error
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError(message.into())
    }

    /// Helper to create dataset unavailable error
    pub fn dataset_unavailable(dataset: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DatasetUnavailable { dataset: dataset.into(), message: message.into() }
    }

    /// Get legacy error code for backward compatibility
    pub fn error_code(&self) -> i32 {
        match self {
            // Upstream dataset errors 2xxx
            Self::DatasetUnavailable { .. } => 2001,
            Self::DatasetAuthFailed { .. } => 2002,
            Self::PrecipService(_) => 2003,

            // Validation errors 4xxx
            Self::ValidationError(_) => 4001,
            Self::InvalidCellIndex(_) => 4002,
            Self::InvalidInput(_) => 4003,

            // System errors 5xxx
            Self::InternalError(_) => 5001,
            Self::RiskComputation { .. } => 5002,
            Self::Other(_) => 5001,
        }
    }
}

/// Structured error response body
#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.error_code();

        // internal errors surface with an opaque message; the detail goes to the log
        let message = match &self {
            Self::InternalError(_) | Self::Other(_) => {
                tracing::error!("Internal error: {}", self);
                "Internal server error".to_string()
            },
            other => other.to_string(),
        };

        let status = match code {
            2001..=2999 => StatusCode::BAD_GATEWAY,
            4001..=4999 => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let response = ApiErrorResponse { code, message, details: None };

        (status, Json(response)).into_response()
    }
}

/// Implement From for serde_json::Error
impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::internal_error(format!("JSON serialization error: {}", err))
    }
}

impl From<h3o::error::InvalidCellIndex> for ApiError {
    fn from(err: h3o::error::InvalidCellIndex) -> Self {
        ApiError::InvalidCellIndex(err.to_string())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
