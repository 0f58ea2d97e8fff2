pub mod openai;
#[cfg(test)]
pub mod testing;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::api::SearchHit;
use crate::models::status::{BatchStatus, FileStatus, VectorStore};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Gateway API error ({status}): {body}")]
    Api { status: u16, body: String },
    #[error("Gateway request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Invalid gateway response: {0}")]
    Decode(String),
    #[error("Invalid gateway request: {0}")]
    InvalidRequest(String),
}

impl GatewayError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// A file ready to be pushed to the hosted file store.
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

impl FileUpload {
    pub fn new(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        data: Vec<u8>,
    ) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            data,
        }
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// One page of vector-store file listings.
#[derive(Debug, Clone, Default)]
pub struct FilePage {
    pub files: Vec<FileStatus>,
    pub has_more: bool,
    pub last_id: Option<String>,
}

/// Hosted vector store and file store operations.
#[async_trait]
pub trait VectorStoreGateway: Send + Sync {
    /// Fetch a vector store by id.
    async fn retrieve_store(&self, store_id: &str) -> Result<VectorStore, GatewayError>;

    /// Create a vector store with a display name.
    async fn create_store(&self, name: &str) -> Result<VectorStore, GatewayError>;

    /// Upload a file to the underlying file store. Returns the remote file id.
    async fn upload_file(&self, file: &FileUpload) -> Result<String, GatewayError>;

    /// Attach already-uploaded files to a vector store as one batch.
    async fn create_file_batch(
        &self,
        store_id: &str,
        file_ids: &[String],
    ) -> Result<BatchStatus, GatewayError>;

    /// Fetch the aggregate state of a batch.
    async fn retrieve_batch(
        &self,
        store_id: &str,
        batch_id: &str,
    ) -> Result<BatchStatus, GatewayError>;

    /// Fetch the processing state of one file in a vector store.
    async fn retrieve_store_file(
        &self,
        store_id: &str,
        file_id: &str,
    ) -> Result<FileStatus, GatewayError>;

    /// List files in a vector store, starting after the `after` cursor.
    async fn list_store_files(
        &self,
        store_id: &str,
        after: Option<&str>,
        limit: u32,
    ) -> Result<FilePage, GatewayError>;

    /// Detach a file from a vector store.
    async fn delete_store_file(&self, store_id: &str, file_id: &str) -> Result<(), GatewayError>;

    /// Delete a file from the underlying file store.
    async fn delete_file(&self, file_id: &str) -> Result<(), GatewayError>;

    /// Semantic search over a vector store.
    async fn search(
        &self,
        store_id: &str,
        query: &str,
        max_results: u32,
    ) -> Result<Vec<SearchHit>, GatewayError>;
}
