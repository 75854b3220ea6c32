use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::gateway::GatewayError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorObject,
}

#[derive(Debug, Serialize)]
pub struct ErrorObject {
    pub code: String,
    pub message: String,
}

#[derive(Debug)]
pub enum ApiError {
    Unauthorized(&'static str, String),
    Forbidden(&'static str, String),
    BadRequest(&'static str, String),
    NotFound(&'static str, String),
    Conflict(&'static str, String),
    /// The clinic backend or document service failed (5xx, unreachable, bad payload).
    Upstream(String),
    Internal(String),
}

impl ApiError {
    pub fn invalid_credentials() -> Self {
        ApiError::Unauthorized("INVALID_CREDENTIALS", "Invalid credentials".into())
    }

    pub fn session_expired() -> Self {
        ApiError::Unauthorized("SESSION_EXPIRED", "Session expired".into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::BadRequest("VALIDATION_ERROR", message.into())
    }

    /// Maps a failed upstream call, preferring the backend's own message over `fallback`.
    pub fn upstream(err: GatewayError, fallback: &str) -> Self {
        let message = err.user_message(fallback);
        match err.status() {
            Some(401) => ApiError::Unauthorized("SESSION_EXPIRED", message),
            Some(403) => ApiError::Forbidden("FORBIDDEN", message),
            Some(404) => ApiError::NotFound("NOT_FOUND", message),
            Some(409) => ApiError::Conflict("CONFLICT", message),
            Some(s) if (400..500).contains(&s) => ApiError::BadRequest("UPSTREAM_REJECTED", message),
            _ => ApiError::Upstream(message),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ApiError::Unauthorized(_, m)
            | ApiError::Forbidden(_, m)
            | ApiError::BadRequest(_, m)
            | ApiError::NotFound(_, m)
            | ApiError::Conflict(_, m)
            | ApiError::Upstream(m)
            | ApiError::Internal(m) => m,
        }
    }

    fn to_error_response(code: &str, message: &str) -> Json<ErrorResponse> {
        Json(ErrorResponse {
            error: ErrorObject {
                code: code.to_string(),
                message: message.to_string(),
            },
        })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthorized(code, msg) => {
                (StatusCode::UNAUTHORIZED, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::Forbidden(code, msg) => {
                (StatusCode::FORBIDDEN, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::BadRequest(code, msg) => {
                (StatusCode::BAD_REQUEST, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::NotFound(code, msg) => {
                (StatusCode::NOT_FOUND, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::Conflict(code, msg) => {
                (StatusCode::CONFLICT, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::Upstream(msg) => (
                StatusCode::BAD_GATEWAY,
                ApiError::to_error_response("UPSTREAM_ERROR", &msg),
            )
                .into_response(),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiError::to_error_response("INTERNAL", &msg),
            )
                .into_response(),
        }
    }
}
