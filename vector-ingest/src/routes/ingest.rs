use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, info_span, Instrument};

use super::ApiError;
use crate::app::AppState;
use crate::auth::require_auth;
use crate::config::Settings;
use crate::gateway::FileUpload;
use crate::models::activity::UploadRecord;
use crate::models::api::{AuthContext, IngestResponse};

/// Multipart field carrying the uploaded files.
const FILES_FIELD: &str = "files";

/// File upload routes.
pub fn routes(max_body_bytes: usize) -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/files/upload", post(upload_files))
        .layer(DefaultBodyLimit::max(max_body_bytes))
}

/// POST /api/files/upload - Upload files and attach them to the vector store as one batch.
async fn upload_files(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<IngestResponse>, ApiError> {
    let auth = require_auth(&headers, &state.settings)?;
    let multipart = multipart.map_err(|e| {
        ApiError::bad_request("Expected a multipart/form-data body").with_details(e.body_text())
    })?;

    let request_id = uuid::Uuid::new_v4();
    let span = info_span!("ingest", %request_id, user_id = %auth.user_id);
    ingest(state, auth, multipart).instrument(span).await
}

async fn ingest(
    state: Arc<AppState>,
    auth: AuthContext,
    mut multipart: Multipart,
) -> Result<Json<IngestResponse>, ApiError> {
    let settings = &state.settings;
    let mut received: Vec<ReceivedFile> = Vec::new();
    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(FILES_FIELD) {
            continue;
        }
        let filename = field.file_name().unwrap_or("upload").to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();

        // Parts past the count or size limit are drained and measured, never kept.
        let keep = received.len() < settings.max_files_per_batch;
        let mut data = Vec::new();
        let mut size: u64 = 0;
        while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
            size += chunk.len() as u64;
            if keep && size <= settings.max_file_size_bytes {
                data.extend_from_slice(&chunk);
            } else if !data.is_empty() {
                data = Vec::new();
            }
        }
        received.push(ReceivedFile {
            upload: FileUpload::new(filename, content_type, data),
            size,
        });
    }

    validate_files(&received, settings)?;
    let files: Vec<FileUpload> = received.into_iter().map(|f| f.upload).collect();
    info!("Accepted {} files for upload", files.len());

    let client = &state.client;
    let store_id = client
        .ensure_vector_store(client.store_name())
        .await
        .map_err(|e| ApiError::upstream("Failed to resolve vector store", e))?;

    let outcome = client.upload_files(&store_id, &files).await;
    let uploaded = outcome.uploaded_count();

    if uploaded == 0 {
        let details = outcome
            .files
            .iter()
            .map(|f| {
                format!(
                    "{}: {}",
                    f.filename,
                    f.error.as_deref().unwrap_or("upload failed")
                )
            })
            .collect::<Vec<_>>()
            .join("; ");
        error!("No files uploaded: {details}");
        return Err(
            ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "No files uploaded")
                .with_details(details),
        );
    }

    if let Some(batch) = &outcome.batch {
        info!(
            "Batch {} holds {} files in vector store {}",
            batch.batch_id,
            batch.file_ids.len(),
            batch.vector_store_id
        );
    }
    let batch_id = outcome.batch.as_ref().map(|b| b.batch_id.clone());
    let now = Utc::now();
    for (file, upload) in outcome.files.iter().zip(&files) {
        if !file.is_uploaded() {
            continue;
        }
        let record = UploadRecord {
            file_id: file.id.clone(),
            filename: file.filename.clone(),
            vector_store_id: store_id.clone(),
            batch_id: batch_id.clone(),
            size_bytes: upload.size(),
            uploaded_at: now,
        };
        state.activity.record_upload(&auth.user_id, &record).await;
    }

    let (success, message) = match (&outcome.batch, &outcome.batch_error) {
        (Some(_), _) => (
            true,
            format!("Uploaded {uploaded} of {} files", files.len()),
        ),
        (None, Some(e)) => (
            false,
            format!("Uploaded {uploaded} files but failed to create the processing batch: {e}"),
        ),
        (None, None) => (
            false,
            format!("Uploaded {uploaded} files but no processing batch was created"),
        ),
    };

    Ok(Json(IngestResponse {
        success,
        files: outcome.files,
        vector_store_id: Some(store_id),
        batch_id,
        message: Some(message),
    }))
}

fn multipart_error(e: MultipartError) -> ApiError {
    ApiError::new(e.status(), "Failed to read multipart body").with_details(e.body_text())
}

/// A `files` part as read from the request. `size` counts every byte received.
struct ReceivedFile {
    upload: FileUpload,
    size: u64,
}

/// Media type without parameters, lowercased.
fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Reject the whole request if any file breaks a constraint, naming every offender.
fn validate_files(files: &[ReceivedFile], settings: &Settings) -> Result<(), ApiError> {
    if files.is_empty() {
        return Err(
            ApiError::bad_request("No files provided").with_details(format!(
                "Attach one or more files in the '{FILES_FIELD}' field"
            )),
        );
    }
    if files.len() > settings.max_files_per_batch {
        return Err(
            ApiError::bad_request("Too many files").with_details(format!(
                "{} files provided, at most {} allowed per upload",
                files.len(),
                settings.max_files_per_batch
            )),
        );
    }

    let mut offenders = Vec::new();
    let mut problems = Vec::new();
    for ReceivedFile { upload: file, size } in files {
        let mut rejected = false;
        let mime = essence(&file.content_type);
        if !settings
            .allowed_mime_types
            .iter()
            .any(|allowed| *allowed == mime)
        {
            problems.push(format!("{}: unsupported file type {mime}", file.filename));
            rejected = true;
        }
        if *size > settings.max_file_size_bytes {
            problems.push(format!(
                "{}: {size} bytes exceeds the {} byte limit",
                file.filename, settings.max_file_size_bytes
            ));
            rejected = true;
        }
        if rejected {
            offenders.push(file.filename.as_str());
        }
    }

    if problems.is_empty() {
        return Ok(());
    }
    Err(
        ApiError::bad_request(format!("Invalid files: {}", offenders.join(", ")))
            .with_details(problems.join("; ")),
    )
}
