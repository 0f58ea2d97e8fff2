use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::routing::{delete, get};
use axum::{Json, Router};
use std::sync::Arc;
use tracing::{error, info};

use super::{validate_id, ApiError};
use crate::app::AppState;
use crate::auth::require_auth;
use crate::models::api::{
    DeleteFileParams, DeleteFileResponse, ListFilesParams, ListFilesResponse,
};

/// Vector-store file management routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/files", get(list_files))
        .route("/api/files/{file_id}", delete(delete_file))
}

/// GET /api/files - Every file attached to a vector store.
async fn list_files(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    params: Result<Query<ListFilesParams>, QueryRejection>,
) -> Result<Json<ListFilesResponse>, ApiError> {
    require_auth(&headers, &state.settings)?;
    let Query(params) = params?;
    validate_id("vectorStoreId", &params.vector_store_id)?;

    let files = state
        .client
        .list_files(&params.vector_store_id, params.limit)
        .await
        .map_err(|e| {
            error!("Failed to list files in {}: {e}", params.vector_store_id);
            ApiError::upstream("Failed to list files", e)
        })?;

    Ok(Json(ListFilesResponse {
        success: true,
        files,
    }))
}

/// DELETE /api/files/{file_id} - Detach a file from the store and delete it.
async fn delete_file(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(file_id): Path<String>,
    params: Result<Query<DeleteFileParams>, QueryRejection>,
) -> Result<Json<DeleteFileResponse>, ApiError> {
    let auth = require_auth(&headers, &state.settings)?;
    let Query(params) = params?;
    validate_id("vectorStoreId", &params.vector_store_id)?;
    validate_id("fileId", &file_id)?;

    state
        .client
        .delete_file(&params.vector_store_id, &file_id)
        .await
        .map_err(|e| {
            error!("{e}");
            ApiError::upstream("Failed to delete file", e)
        })?;

    info!("User {} deleted file {file_id}", auth.user_id);
    Ok(Json(DeleteFileResponse {
        success: true,
        file_id,
    }))
}
