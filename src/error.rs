use std::time::Duration;

use axum::{
    Json,
    http::{StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::judge::JudgeError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Submission quota exceeded")]
    RateLimited { retry_after: Duration },
    #[error("{0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Judge(#[from] JudgeError),
    #[error("{0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Judge(JudgeError::Client { .. }) => StatusCode::BAD_GATEWAY,
            Self::Judge(JudgeError::Timeout { .. } | JudgeError::Cancelled) => {
                StatusCode::GATEWAY_TIMEOUT
            }
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            let upstream_status = match &self {
                Self::Judge(err) => err.status_code(),
                _ => None,
            };
            tracing::warn!(
                status = %status,
                upstream_status = ?upstream_status,
                error = %self,
                "request failed"
            );
        }
        let body = Json(ErrorBody {
            error: self.to_string(),
        });
        match self {
            Self::RateLimited { retry_after } => {
                let secs = retry_after.as_secs_f64().ceil().max(1.0) as u64;
                (status, [(RETRY_AFTER, secs.to_string())], body).into_response()
            }
            _ => (status, body).into_response(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(value: anyhow::Error) -> Self {
        Self::Internal(format!("{value:#}"))
    }
}
