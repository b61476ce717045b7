//! Liveness probe.
use axum::http::StatusCode;

pub(crate) async fn status() -> StatusCode {
    StatusCode::OK
}
