// src/error.rs

use axum::http::StatusCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ForecastError>;

/// Every way a forecast or graph request can fail, one variant per pipeline stage.
#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("fetching {url} failed: {reason}")]
    Fetch { url: String, reason: String },

    #[error("fetching {url} timed out after {attempts} attempt(s)")]
    Timeout { url: String, attempts: u32 },

    #[error("upstream {url} answered with status {status}")]
    Status { url: String, status: u16 },

    #[error("malformed feed at line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("insufficient data: need at least {required} rows, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("model error: {0}")]
    Model(String),

    #[error("graph rendering failed: {0}")]
    Render(String),
}

impl ForecastError {
    /// Machine-readable code sent alongside the message.
    pub fn code(&self) -> &'static str {
        match self {
            ForecastError::Fetch { .. } => "fetch_error",
            ForecastError::Timeout { .. } => "fetch_timeout",
            ForecastError::Status { .. } => "upstream_status",
            ForecastError::Parse { .. } => "parse_error",
            ForecastError::InsufficientData { .. } => "insufficient_data",
            ForecastError::Model(_) => "model_error",
            ForecastError::Render(_) => "render_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ForecastError::Fetch { .. }
            | ForecastError::Timeout { .. }
            | ForecastError::Status { .. } => StatusCode::BAD_GATEWAY,
            ForecastError::Parse { .. } | ForecastError::InsufficientData { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ForecastError::Model(_) | ForecastError::Render(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Whether another attempt at the same request could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ForecastError::Fetch { .. } | ForecastError::Timeout { .. } => true,
            ForecastError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }

    pub(crate) fn parse(line: usize, reason: impl Into<String>) -> Self {
        ForecastError::Parse {
            line,
            reason: reason.into(),
        }
    }
}
