use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use std::sync::Arc;
use tracing::{error, info, warn};

use super::{validate_id, ApiError};
use crate::app::AppState;
use crate::auth::require_auth;
use crate::models::api::{StatusRequest, StatusResponse};
use crate::models::status::{BatchStatus, StatusTally};
use crate::vector_store::PollOutcome;

/// Processing status routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/files/status", post(file_status))
}

/// POST /api/files/status - Batch or per-file processing status.
async fn file_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<StatusRequest>, JsonRejection>,
) -> Result<Json<StatusResponse>, ApiError> {
    require_auth(&headers, &state.settings)?;
    let Json(req) = body?;

    let store_id = req
        .vector_store_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::bad_request("vectorStoreId is required"))?;
    validate_id("vectorStoreId", store_id)?;

    if let Some(batch_id) = req.batch_id.as_deref().filter(|id| !id.is_empty()) {
        validate_id("batchId", batch_id)?;
        return batch_status(&state, store_id, batch_id, req.wait)
            .await
            .map(Json);
    }

    match req.file_ids.as_deref() {
        Some(file_ids) if !file_ids.is_empty() => {
            let limit = state.settings.max_files_per_batch;
            if file_ids.len() > limit {
                return Err(
                    ApiError::bad_request("Too many fileIds").with_details(format!(
                        "{} fileIds provided, at most {limit} allowed per request",
                        file_ids.len()
                    )),
                );
            }
            for file_id in file_ids {
                validate_id("fileIds", file_id)?;
            }
            let files = state.client.check_file_status(store_id, file_ids).await;
            let tally = StatusTally::from_files(&files);
            Ok(Json(StatusResponse {
                success: true,
                status: tally.overall(files.len() as u64),
                files: Some(files),
                completed_count: tally.completed,
                in_progress_count: tally.in_progress,
                failed_count: tally.failed,
            }))
        }
        _ => Err(ApiError::bad_request(
            "Either batchId or fileIds is required",
        )),
    }
}

async fn batch_status(
    state: &AppState,
    store_id: &str,
    batch_id: &str,
    wait: bool,
) -> Result<StatusResponse, ApiError> {
    let batch = if wait {
        let outcome = state
            .client
            .wait_for_processing(store_id, batch_id, state.settings.poll_config())
            .await;
        let status = outcome.status();
        if outcome.is_success() {
            info!("Batch {batch_id} completed");
        } else if !status.is_terminal() {
            warn!("Batch {batch_id} still {status} when the wait ended");
        }
        match outcome {
            PollOutcome::Completed(batch)
            | PollOutcome::Failed(batch)
            | PollOutcome::Cancelled(batch) => batch,
            PollOutcome::TimedOut {
                last: Some(last), ..
            } => BatchStatus { status, ..last },
            PollOutcome::TimedOut { last: None, waited } => {
                error!("Batch {batch_id} could not be read within {waited:?}");
                return Err(ApiError::upstream(
                    "Failed to retrieve batch status",
                    format!("no successful status check within {waited:?}"),
                ));
            }
        }
    } else {
        state
            .client
            .check_batch_status(store_id, batch_id)
            .await
            .map_err(|e| {
                error!("Failed to retrieve batch {batch_id}: {e}");
                ApiError::upstream("Failed to retrieve batch status", e)
            })?
    };

    let tally = StatusTally::from_counts(&batch.file_counts);
    Ok(StatusResponse {
        success: true,
        status: batch.status,
        files: None,
        completed_count: tally.completed,
        in_progress_count: tally.in_progress,
        failed_count: tally.failed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::testing::{batch, FakeGateway};
    use crate::models::status::{FileCounts, ProcessingStatus};
    use crate::routes::test_support::{bearer, json_request, router_with, send, settings, state};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::json;

    fn completed_batch() -> BatchStatus {
        batch(
            "batch-1",
            ProcessingStatus::Completed,
            FileCounts {
                completed: 3,
                total: 3,
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_completed_batch() {
        let gateway = Arc::new(FakeGateway::new());
        gateway.script_batch("batch-1", vec![Ok(completed_batch())]);
        let (router, _) = router_with(gateway);

        let (status, body) = send(
            router,
            json_request(
                "POST",
                "/api/files/status",
                json!({"vectorStoreId": "vs-1", "batchId": "batch-1"}),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({
                "success": true,
                "status": "completed",
                "completedCount": 3,
                "inProgressCount": 0,
                "failedCount": 0
            })
        );
    }

    #[tokio::test]
    async fn test_batch_failed_count_includes_cancelled() {
        let gateway = Arc::new(FakeGateway::new());
        gateway.script_batch(
            "batch-1",
            vec![Ok(batch(
                "batch-1",
                ProcessingStatus::Cancelled,
                FileCounts {
                    completed: 1,
                    failed: 1,
                    cancelled: 2,
                    total: 4,
                    ..Default::default()
                },
            ))],
        );
        let (router, _) = router_with(gateway);

        let (_, body) = send(
            router,
            json_request(
                "POST",
                "/api/files/status",
                json!({"vectorStoreId": "vs-1", "batchId": "batch-1"}),
            ),
        )
        .await;

        assert_eq!(body["status"], "cancelled");
        assert_eq!(body["failedCount"], 3);
    }

    #[tokio::test]
    async fn test_neither_batch_nor_files_is_400() {
        let gateway = Arc::new(FakeGateway::new());
        let (router, _) = router_with(gateway);

        let (status, body) = send(
            router.clone(),
            json_request(
                "POST",
                "/api/files/status",
                json!({"vectorStoreId": "vs-1"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Either batchId or fileIds is required");

        let (status, _) = send(
            router,
            json_request(
                "POST",
                "/api/files/status",
                json!({"vectorStoreId": "vs-1", "fileIds": []}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_missing_store_id_is_400() {
        let (router, _) = router_with(Arc::new(FakeGateway::new()));
        let (status, body) = send(
            router,
            json_request("POST", "/api/files/status", json!({"batchId": "batch-1"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "vectorStoreId is required");
    }

    #[tokio::test]
    async fn test_malformed_json_is_400() {
        let (router, _) = router_with(Arc::new(FakeGateway::new()));
        let request = Request::builder()
            .method("POST")
            .uri("/api/files/status")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();

        let (status, body) = send(router, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid JSON body");
    }

    #[tokio::test]
    async fn test_unauthenticated_is_401() {
        let gateway = Arc::new(FakeGateway::new());
        gateway.script_batch("batch-1", vec![Ok(completed_batch())]);
        let router = crate::routes::build_router(state(gateway, settings(false)));
        let payload = json!({"vectorStoreId": "vs-1", "batchId": "batch-1"});

        let (status, _) = send(
            router.clone(),
            json_request("POST", "/api/files/status", payload.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let mut request = json_request("POST", "/api/files/status", payload);
        request
            .headers_mut()
            .insert("authorization", bearer("alice").parse().unwrap());
        let (status, _) = send(router, request).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_file_mode_aggregation() {
        let gateway = Arc::new(FakeGateway::new());
        gateway.set_file("f1", ProcessingStatus::Completed);
        gateway.set_file("f2", ProcessingStatus::Completed);
        gateway.set_file("f3", ProcessingStatus::Failed);
        gateway.set_file("f4", ProcessingStatus::Failed);
        gateway.set_file("f5", ProcessingStatus::InProgress);
        let (router, _) = router_with(gateway);

        let cases = [
            (json!(["f1", "f2"]), "completed", 2, 0, 0),
            (json!(["f3", "f4"]), "failed", 0, 0, 2),
            (json!(["f1", "f5"]), "in_progress", 1, 1, 0),
            (json!(["f1", "f3"]), "in_progress", 1, 0, 1),
        ];
        for (file_ids, expected, completed, in_progress, failed) in cases {
            let (status, body) = send(
                router.clone(),
                json_request(
                    "POST",
                    "/api/files/status",
                    json!({"vectorStoreId": "vs-1", "fileIds": file_ids.clone()}),
                ),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["status"], expected, "fileIds {file_ids}");
            assert_eq!(body["completedCount"], completed);
            assert_eq!(body["inProgressCount"], in_progress);
            assert_eq!(body["failedCount"], failed);
        }
    }

    #[tokio::test]
    async fn test_file_lookup_failure_is_isolated() {
        let gateway = Arc::new(FakeGateway::new());
        gateway.set_file("f1", ProcessingStatus::Completed);
        let (router, _) = router_with(gateway);

        let (status, body) = send(
            router,
            json_request(
                "POST",
                "/api/files/status",
                json!({"vectorStoreId": "vs-1", "fileIds": ["f1", "missing"]}),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let files = body["files"].as_array().unwrap();
        assert_eq!(files[0]["status"], "completed");
        assert_eq!(files[1]["status"], "failed");
        assert!(files[1]["error"]
            .as_str()
            .unwrap()
            .contains("Failed to retrieve file status"));
        assert_eq!(body["status"], "in_progress");
    }

    #[tokio::test]
    async fn test_too_many_file_ids_is_400() {
        let gateway = Arc::new(FakeGateway::new());
        let (router, _) = router_with(gateway.clone());

        let (status, body) = send(
            router,
            json_request(
                "POST",
                "/api/files/status",
                json!({"vectorStoreId": "vs-1", "fileIds": ["f1", "f2", "f3", "f4"]}),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Too many fileIds");
        assert_eq!(gateway.state.lock().unwrap().max_lookups_in_flight, 0);
    }

    #[tokio::test]
    async fn test_ids_outside_segment_charset_are_400() {
        let (router, _) = router_with(Arc::new(FakeGateway::new()));

        let cases = [
            (
                json!({"vectorStoreId": "../files", "batchId": "batch-1"}),
                "Invalid vectorStoreId",
            ),
            (
                json!({"vectorStoreId": "vs-1", "batchId": "b/../x"}),
                "Invalid batchId",
            ),
            (
                json!({"vectorStoreId": "vs-1", "fileIds": ["f1", ".."]}),
                "Invalid fileIds",
            ),
        ];
        for (payload, expected) in cases {
            let (status, body) = send(
                router.clone(),
                json_request("POST", "/api/files/status", payload),
            )
            .await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["error"], expected);
        }
    }

    #[tokio::test]
    async fn test_batch_mode_wins_over_file_ids() {
        let gateway = Arc::new(FakeGateway::new());
        gateway.script_batch("batch-1", vec![Ok(completed_batch())]);
        let (router, _) = router_with(gateway);

        let (_, body) = send(
            router,
            json_request(
                "POST",
                "/api/files/status",
                json!({"vectorStoreId": "vs-1", "batchId": "batch-1", "fileIds": ["f1"]}),
            ),
        )
        .await;
        assert_eq!(body["completedCount"], 3);
        assert!(body.get("files").is_none());
    }

    #[tokio::test]
    async fn test_batch_lookup_error_is_500() {
        let (router, _) = router_with(Arc::new(FakeGateway::new()));
        let (status, body) = send(
            router,
            json_request(
                "POST",
                "/api/files/status",
                json!({"vectorStoreId": "vs-1", "batchId": "unknown"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Failed to retrieve batch status");
        assert!(body["details"].is_string());
    }

    #[tokio::test]
    async fn test_wait_polls_until_terminal() {
        let gateway = Arc::new(FakeGateway::new());
        let pending = batch(
            "batch-1",
            ProcessingStatus::InProgress,
            FileCounts {
                in_progress: 3,
                total: 3,
                ..Default::default()
            },
        );
        gateway.script_batch("batch-1", vec![Ok(pending), Ok(completed_batch())]);
        let (router, _) = router_with(gateway.clone());

        let (_, body) = send(
            router,
            json_request(
                "POST",
                "/api/files/status",
                json!({"vectorStoreId": "vs-1", "batchId": "batch-1", "wait": true}),
            ),
        )
        .await;
        assert_eq!(body["status"], "completed");
        assert_eq!(gateway.state.lock().unwrap().retrieve_batch_calls, 2);
    }

    #[tokio::test]
    async fn test_wait_timeout_reports_in_progress() {
        let gateway = Arc::new(FakeGateway::new());
        let pending = batch(
            "batch-1",
            ProcessingStatus::InProgress,
            FileCounts {
                completed: 1,
                in_progress: 2,
                total: 3,
                ..Default::default()
            },
        );
        gateway.script_batch("batch-1", vec![Ok(pending)]);
        let (router, _) = router_with(gateway);

        let (status, body) = send(
            router,
            json_request(
                "POST",
                "/api/files/status",
                json!({"vectorStoreId": "vs-1", "batchId": "batch-1", "wait": true}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "in_progress");
        assert_eq!(body["completedCount"], 1);
        assert_eq!(body["inProgressCount"], 2);
    }
}
