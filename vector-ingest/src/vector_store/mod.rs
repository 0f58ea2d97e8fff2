pub mod persistence;
pub mod status;

use futures::future::join_all;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tracing::{error, info, warn};

use crate::gateway::{FileUpload, GatewayError, VectorStoreGateway};
use crate::models::api::SearchHit;
use crate::models::status::{FileStatus, UploadBatch, UploadState, UploadedFile};
use persistence::StoreIdPersistence;

pub use status::{PollConfig, PollOutcome};

/// Upper bound on pages fetched by `list_files`, independent of gateway behaviour.
const MAX_LIST_PAGES: usize = 1000;

/// Construction-time settings for [`VectorStoreClient`].
#[derive(Debug, Clone)]
pub struct VectorStoreConfig {
    /// Display name used when a store has to be created.
    pub name: String,
    /// Pre-provisioned store id, if any.
    pub configured_id: Option<String>,
    /// Maximum number of file uploads in flight at once.
    pub upload_concurrency: usize,
}

/// Result of one `upload_files` call.
#[derive(Debug, Clone, Default)]
pub struct UploadOutcome {
    /// One entry per input file, in input order.
    pub files: Vec<UploadedFile>,
    pub batch: Option<UploadBatch>,
    /// Set when files uploaded but the batch could not be created.
    pub batch_error: Option<String>,
}

impl UploadOutcome {
    pub fn uploaded_count(&self) -> usize {
        self.files.iter().filter(|f| f.is_uploaded()).count()
    }
}

#[derive(Debug, Error)]
pub enum DeleteFileError {
    #[error("Failed to remove {file_id} from vector store: {source}")]
    VectorStore {
        file_id: String,
        source: GatewayError,
    },
    #[error("Failed to delete file {file_id}: {source}")]
    FileStore {
        file_id: String,
        source: GatewayError,
    },
    #[error("Failed to delete {file_id} from vector store ({vector_store}) and file store ({file_store})")]
    Both {
        file_id: String,
        vector_store: GatewayError,
        file_store: GatewayError,
    },
}

/// Client for store resolution, uploads and status checks against the hosted vector store.
pub struct VectorStoreClient {
    gateway: Arc<dyn VectorStoreGateway>,
    config: VectorStoreConfig,
    persistence: Option<Arc<dyn StoreIdPersistence>>,
    /// Resolved store id. The lock also serialises store creation within this process.
    resolved_id: Mutex<Option<String>>,
    upload_semaphore: Arc<Semaphore>,
}

impl VectorStoreClient {
    pub fn new(gateway: Arc<dyn VectorStoreGateway>, config: VectorStoreConfig) -> Self {
        let permits = config.upload_concurrency.max(1);
        Self {
            gateway,
            config,
            persistence: None,
            resolved_id: Mutex::new(None),
            upload_semaphore: Arc::new(Semaphore::new(permits)),
        }
    }

    pub fn with_persistence(mut self, persistence: Arc<dyn StoreIdPersistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub fn store_name(&self) -> &str {
        &self.config.name
    }

    /// Resolve the store id, creating a store named `name` if no known id resolves.
    ///
    /// Candidates are tried in order: the id resolved earlier in this process,
    /// the configured id, then the persisted id. A failed candidate is abandoned.
    pub async fn ensure_vector_store(&self, name: &str) -> Result<String, GatewayError> {
        let mut resolved = self.resolved_id.lock().await;

        let mut candidates: Vec<String> = Vec::new();
        let persisted = match &self.persistence {
            Some(persistence) => persistence.load().await,
            None => None,
        };
        for id in [
            resolved.clone(),
            self.config.configured_id.clone(),
            persisted,
        ]
        .into_iter()
        .flatten()
        {
            if !id.is_empty() && !candidates.contains(&id) {
                candidates.push(id);
            }
        }

        for candidate in candidates {
            match self.gateway.retrieve_store(&candidate).await {
                Ok(store) if store.lifecycle.is_usable() => {
                    if resolved.as_deref() != Some(store.id.as_str()) {
                        info!(
                            "Using vector store {} ({}, {} files)",
                            store.id,
                            store.name.as_deref().unwrap_or("unnamed"),
                            store.file_counts.total
                        );
                        *resolved = Some(store.id.clone());
                    }
                    return Ok(store.id);
                }
                Ok(store) => {
                    warn!(
                        "Vector store {} is not usable ({:?}), skipping",
                        store.id, store.lifecycle
                    );
                }
                Err(e) if e.is_not_found() => {
                    warn!("Vector store {candidate} no longer exists");
                }
                Err(e) => {
                    warn!("Could not resolve vector store {candidate}: {e}");
                }
            }
        }

        let store = self.gateway.create_store(name).await.map_err(|e| {
            error!("Failed to create vector store {name}: {e}");
            e
        })?;
        info!("Created vector store {} ({name})", store.id);

        *resolved = Some(store.id.clone());
        if let Some(persistence) = &self.persistence {
            persistence.save(&store.id).await;
        }
        Ok(store.id)
    }

    /// Upload a single file to the file store. Failures are captured in the result.
    pub async fn upload_file(&self, file: &FileUpload) -> UploadedFile {
        let _permit = match self.upload_semaphore.acquire().await {
            Ok(permit) => permit,
            Err(e) => return failed_upload(file, format!("Upload queue closed: {e}")),
        };

        match self.gateway.upload_file(file).await {
            Ok(id) => UploadedFile {
                id,
                filename: file.filename.clone(),
                status: UploadState::Uploaded,
                error: None,
            },
            Err(e) => {
                warn!("Failed to upload {}: {e}", file.filename);
                failed_upload(file, e.to_string())
            }
        }
    }

    /// Upload every file, then attach the successful ones to `store_id` as one batch.
    pub async fn upload_files(&self, store_id: &str, files: &[FileUpload]) -> UploadOutcome {
        let mut results = join_all(files.iter().map(|f| self.upload_file(f))).await;

        let file_ids: Vec<String> = results
            .iter()
            .filter(|f| f.is_uploaded())
            .map(|f| f.id.clone())
            .collect();

        if file_ids.is_empty() {
            warn!("No files uploaded out of {}", files.len());
            return UploadOutcome {
                files: results,
                batch: None,
                batch_error: None,
            };
        }

        match self.gateway.create_file_batch(store_id, &file_ids).await {
            Ok(batch) => {
                for file in results.iter_mut().filter(|f| f.is_uploaded()) {
                    file.status = UploadState::InProgress;
                }
                info!(
                    "Created batch {} with {} files in vector store {store_id}",
                    batch.batch_id,
                    file_ids.len()
                );
                UploadOutcome {
                    files: results,
                    batch: Some(UploadBatch {
                        batch_id: batch.batch_id,
                        vector_store_id: store_id.to_string(),
                        file_ids,
                    }),
                    batch_error: None,
                }
            }
            Err(e) => {
                error!("Failed to create file batch in {store_id}: {e}");
                UploadOutcome {
                    files: results,
                    batch: None,
                    batch_error: Some(e.to_string()),
                }
            }
        }
    }

    /// List every file in a store, following the pagination cursor.
    pub async fn list_files(
        &self,
        store_id: &str,
        page_size: u32,
    ) -> Result<Vec<FileStatus>, GatewayError> {
        self.list_files_capped(store_id, page_size, MAX_LIST_PAGES)
            .await
    }

    async fn list_files_capped(
        &self,
        store_id: &str,
        page_size: u32,
        max_pages: usize,
    ) -> Result<Vec<FileStatus>, GatewayError> {
        let page_size = page_size.clamp(1, 100);
        let mut files = Vec::new();
        let mut after: Option<String> = None;

        for page_number in 1..=max_pages {
            let page = self
                .gateway
                .list_store_files(store_id, after.as_deref(), page_size)
                .await?;
            files.extend(page.files);

            if !page.has_more {
                return Ok(files);
            }
            match page.last_id {
                Some(last) if after.as_deref() != Some(last.as_str()) => after = Some(last),
                _ => {
                    warn!("Gateway reported more files in {store_id} without a new cursor");
                    return Ok(files);
                }
            }
            if page_number == max_pages {
                warn!(
                    "Stopped listing {store_id} after {max_pages} pages with {} files",
                    files.len()
                );
            }
        }
        Ok(files)
    }

    /// Remove a file from the store and from the file store.
    ///
    /// Both deletions are always attempted; there is no rollback.
    pub async fn delete_file(&self, store_id: &str, file_id: &str) -> Result<(), DeleteFileError> {
        let detached = self.gateway.delete_store_file(store_id, file_id).await;
        let deleted = self.gateway.delete_file(file_id).await;

        match (detached, deleted) {
            (Ok(()), Ok(())) => {
                info!("Deleted file {file_id} from vector store {store_id}");
                Ok(())
            }
            (Err(source), Ok(())) => Err(DeleteFileError::VectorStore {
                file_id: file_id.to_string(),
                source,
            }),
            (Ok(()), Err(source)) => Err(DeleteFileError::FileStore {
                file_id: file_id.to_string(),
                source,
            }),
            (Err(vector_store), Err(file_store)) => Err(DeleteFileError::Both {
                file_id: file_id.to_string(),
                vector_store,
                file_store,
            }),
        }
    }

    pub async fn search(
        &self,
        store_id: &str,
        query: &str,
        max_results: u32,
    ) -> Result<Vec<SearchHit>, GatewayError> {
        self.gateway
            .search(store_id, query, max_results.clamp(1, 50))
            .await
    }
}

fn failed_upload(file: &FileUpload, error: String) -> UploadedFile {
    UploadedFile {
        id: String::new(),
        filename: file.filename.clone(),
        status: UploadState::Failed,
        error: Some(error),
    }
}
