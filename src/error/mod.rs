use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::triggers::TriggerError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<TriggerError> for AppError {
    fn from(err: TriggerError) -> Self {
        match err {
            TriggerError::EmptyPayload => AppError::Validation(err.to_string()),
            TriggerError::QueueFull | TriggerError::Closed => AppError::Unavailable(err.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

/// `RUN_MODE=production` (or `prod`) hides internal detail from clients
fn is_production() -> bool {
    matches!(
        std::env::var("RUN_MODE").as_deref(),
        Ok("production") | Ok("prod")
    )
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Unavailable(_) => "SERVICE_UNAVAILABLE",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn detail(&self) -> &str {
        match self {
            AppError::Validation(msg) | AppError::Unavailable(msg) | AppError::Internal(msg) => msg,
        }
    }

    fn client_message(&self) -> String {
        match self {
            AppError::Internal(_) if is_production() => "Internal server error".to_string(),
            _ => self.detail().to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        let detail = self.detail().to_string();

        if status.is_server_error() {
            tracing::error!(code, status = status.as_u16(), message = %detail, "API error");
        } else {
            tracing::warn!(code, status = status.as_u16(), message = %detail, "API request rejected");
        }

        let body = ErrorResponse {
            error: ErrorBody {
                code,
                message: self.client_message(),
            },
        };
        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
