use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::routing::get;
use axum::{Json, Router};
use std::sync::Arc;

use super::ApiError;
use crate::app::AppState;
use crate::auth::require_auth;
use crate::models::api::{ActivityParams, ActivityResponse};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/activity", get(recent_activity))
}

/// GET /api/activity - The caller's recent uploads and searches, newest first.
async fn recent_activity(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    params: Result<Query<ActivityParams>, QueryRejection>,
) -> Result<Json<ActivityResponse>, ApiError> {
    let auth = require_auth(&headers, &state.settings)?;
    let Query(params) = params?;

    let uploads = state
        .activity
        .recent_uploads(&auth.user_id, params.limit)
        .await;
    let searches = state
        .activity
        .recent_searches(&auth.user_id, params.limit)
        .await;
    Ok(Json(ActivityResponse { uploads, searches }))
}
