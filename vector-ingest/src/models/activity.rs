use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One file accepted by the upload route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRecord {
    pub file_id: String,
    pub filename: String,
    pub vector_store_id: String,
    #[serde(default)]
    pub batch_id: Option<String>,
    pub size_bytes: u64,
    pub uploaded_at: DateTime<Utc>,
}

/// One query run against the vector store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRecord {
    pub query: String,
    pub vector_store_id: String,
    pub result_count: usize,
    pub searched_at: DateTime<Utc>,
}
