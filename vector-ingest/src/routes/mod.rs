pub mod activity;
pub mod files;
pub mod ingest;
pub mod search;
pub mod status;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use std::fmt::Display;
use std::sync::Arc;

use crate::app::AppState;
use crate::models::api::ErrorResponse;

/// Build all API routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    let max_upload_bytes = state.settings.max_request_bytes();
    Router::new()
        .merge(ingest::routes(max_upload_bytes))
        .merge(status::routes())
        .merge(files::routes())
        .merge(search::routes())
        .merge(activity::routes())
        .with_state(state)
}

/// Error returned by every handler, rendered as `{error, details?}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub error: String,
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            status,
            error: error.into(),
            details: None,
        }
    }

    pub fn bad_request(error: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error)
    }

    pub fn unauthorized(error: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, error)
    }

    /// 500 with a short message and the technical cause in `details`.
    pub fn upstream(error: impl Into<String>, cause: impl Display) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, error).with_details(cause.to_string())
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Gateway ids travel as URL path segments, so only `[A-Za-z0-9_-]+` is accepted.
pub fn validate_id(field: &str, id: &str) -> Result<(), ApiError> {
    let valid = !id.is_empty()
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
    if valid {
        return Ok(());
    }
    Err(
        ApiError::bad_request(format!("Invalid {field}")).with_details(format!(
            "{field} may only contain letters, digits, '-' and '_'"
        )),
    )
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.error,
            details: self.details,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request("Invalid JSON body").with_details(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request("Invalid query parameters").with_details(rejection.body_text())
    }
}
