use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use std::sync::Arc;
use tracing::error;

use super::{validate_id, ApiError};
use crate::app::AppState;
use crate::auth::require_auth;
use crate::models::activity::SearchRecord;
use crate::models::api::{SearchRequest, SearchResponse};

/// Search routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/search", post(search))
}

/// POST /api/search - Query the vector store.
async fn search(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<SearchResponse>, ApiError> {
    let auth = require_auth(&headers, &state.settings)?;
    let Json(req) = body?;

    let query = req.query.trim();
    if query.is_empty() {
        return Err(ApiError::bad_request("query must not be empty"));
    }

    let store_id = match req.vector_store_id.filter(|id| !id.is_empty()) {
        Some(id) => {
            validate_id("vectorStoreId", &id)?;
            id
        }
        None => state
            .client
            .ensure_vector_store(state.client.store_name())
            .await
            .map_err(|e| ApiError::upstream("Failed to resolve vector store", e))?,
    };

    let results = state
        .client
        .search(&store_id, query, req.max_results)
        .await
        .map_err(|e| {
            error!("Search in {store_id} failed: {e}");
            ApiError::upstream("Search failed", e)
        })?;

    let record = SearchRecord {
        query: query.to_string(),
        vector_store_id: store_id,
        result_count: results.len(),
        searched_at: Utc::now(),
    };
    state.activity.record_search(&auth.user_id, &record).await;

    Ok(Json(SearchResponse {
        success: true,
        results,
    }))
}
