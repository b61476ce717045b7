//! API error types and helpers.
//!
//! # Purpose
//! Centralizes HTTP error response construction so every endpoint fails
//! with the same `{"error": …}` JSON shape.
use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status, Json(self.body)).into_response()
    }
}

fn api_error(status: StatusCode, message: &str) -> ApiError {
    ApiError {
        status,
        body: ErrorBody {
            error: message.to_string(),
        },
    }
}

pub fn api_unauthorized(message: &str) -> ApiError {
    api_error(StatusCode::UNAUTHORIZED, message)
}

pub fn api_forbidden(message: &str) -> ApiError {
    api_error(StatusCode::FORBIDDEN, message)
}

pub fn api_unprocessable(message: &str) -> ApiError {
    api_error(StatusCode::UNPROCESSABLE_ENTITY, message)
}

pub fn api_unavailable(message: &str) -> ApiError {
    api_error(StatusCode::SERVICE_UNAVAILABLE, message)
}

pub fn api_internal(message: &str) -> ApiError {
    api_error(StatusCode::INTERNAL_SERVER_ERROR, message)
}
