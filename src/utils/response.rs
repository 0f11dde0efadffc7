#![allow(dead_code)]
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::engine::EngineError;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
    pub timestamp: i64,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn error(code: &str, message: &str) -> ApiResponse<()> {
        ApiResponse {
            success: false,
            data: None,
            error: Some(ApiError {
                code: code.to_string(),
                message: message.to_string(),
            }),
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

/// Application error type
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, code: &str, message: &str) -> Self {
        Self {
            status,
            code: code.to_string(),
            message: message.to_string(),
        }
    }

    pub fn bad_request(code: &str, message: &str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, message)
    }

    pub fn unauthorized(message: &str) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    pub fn not_found(message: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn unavailable(message: &str) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE", message)
    }

    pub fn internal(message: &str) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ApiResponse::<()>::error(&self.code, &self.message);
        (self.status, Json(body)).into_response()
    }
}

/// User-surfaced engine errors become 4xx envelopes; operational errors
/// reach callers only as refusals, the detail stays in logs and health.
impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        match &err {
            EngineError::SymbolNotFound(_) => {
                AppError::bad_request("INVALID_SYMBOL", &err.to_string())
            }
            EngineError::PairInactive(_) => {
                AppError::bad_request("PAIR_INACTIVE", &err.to_string())
            }
            EngineError::Validation(_) => AppError::bad_request("VALIDATION", &err.to_string()),
            EngineError::InsufficientFunds { .. } => {
                AppError::bad_request("INSUFFICIENT_FUNDS", &err.to_string())
            }
            EngineError::OrderNotFound(_) => AppError::not_found(&err.to_string()),
            EngineError::NotOrderOwner(_) => {
                AppError::new(StatusCode::FORBIDDEN, "NOT_OWNER", &err.to_string())
            }
            EngineError::NotCancellable(_) => {
                AppError::bad_request("NOT_CANCELLABLE", &err.to_string())
            }
            EngineError::IntakeExpired => AppError::unavailable("order intake deadline exceeded"),
            EngineError::LaneUnavailable => AppError::unavailable("matching lane unavailable"),
            EngineError::ChangeQueue(_) | EngineError::Store(_) => {
                tracing::error!(error = %err, "operational failure surfaced at the API edge");
                AppError::unavailable("service temporarily unavailable")
            }
        }
    }
}
