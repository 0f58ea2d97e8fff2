use serde::{Deserialize, Serialize};

/// Processing state of a file or batch inside the hosted vector store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl ProcessingStatus {
    /// Map a vendor status string into the closed set.
    ///
    /// Anything unrecognised (or missing) is reported as `InProgress` so a caller
    /// never sees `Completed` without the gateway saying so.
    pub fn from_vendor(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("completed") => Self::Completed,
            Some("failed") => Self::Failed,
            Some("cancelled") | Some("canceled") => Self::Cancelled,
            _ => Self::InProgress,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::InProgress)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a remote vector store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreLifecycle {
    Uninitialized,
    Creating,
    Ready,
    Error,
}

impl StoreLifecycle {
    pub fn from_vendor(raw: Option<&str>) -> Self {
        match raw {
            Some("completed") => Self::Ready,
            Some("in_progress") => Self::Creating,
            Some("expired") => Self::Error,
            _ => Self::Uninitialized,
        }
    }

    /// Whether a store in this state may still receive files.
    pub fn is_usable(self) -> bool {
        !matches!(self, Self::Error)
    }
}

/// Per-status file counts reported by the gateway.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileCounts {
    #[serde(default)]
    pub in_progress: u64,
    #[serde(default)]
    pub completed: u64,
    #[serde(default)]
    pub failed: u64,
    #[serde(default)]
    pub cancelled: u64,
    #[serde(default)]
    pub total: u64,
}

/// Resolved view of a remote vector store.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorStore {
    pub id: String,
    pub name: Option<String>,
    pub lifecycle: StoreLifecycle,
    pub file_counts: FileCounts,
}

/// A batch as created by this service. Membership never changes after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadBatch {
    pub batch_id: String,
    pub vector_store_id: String,
    pub file_ids: Vec<String>,
}

/// Observed state of a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchStatus {
    pub batch_id: String,
    pub status: ProcessingStatus,
    pub file_counts: FileCounts,
}

/// Upload-time state of a single file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadState {
    /// Stored in the file store but not attached to any batch.
    Uploaded,
    /// Attached to a batch that the gateway is indexing.
    InProgress,
    Failed,
}

/// Result of uploading one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadedFile {
    /// Remote file id; empty when the upload failed.
    pub id: String,
    pub filename: String,
    pub status: UploadState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UploadedFile {
    pub fn is_uploaded(&self) -> bool {
        self.status != UploadState::Failed && !self.id.is_empty()
    }
}

/// Processing state of one file inside a vector store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileStatus {
    pub id: String,
    pub status: ProcessingStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Tally of per-file statuses, with cancelled files counted as failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusTally {
    pub completed: u64,
    pub in_progress: u64,
    pub failed: u64,
}

impl StatusTally {
    pub fn from_files(files: &[FileStatus]) -> Self {
        let mut tally = Self::default();
        for file in files {
            match file.status {
                ProcessingStatus::Completed => tally.completed += 1,
                ProcessingStatus::InProgress => tally.in_progress += 1,
                ProcessingStatus::Failed | ProcessingStatus::Cancelled => tally.failed += 1,
            }
        }
        tally
    }

    pub fn from_counts(counts: &FileCounts) -> Self {
        Self {
            completed: counts.completed,
            in_progress: counts.in_progress,
            failed: counts.failed + counts.cancelled,
        }
    }

    /// Overall status for a set of `total` files.
    ///
    /// Any in-progress file keeps the whole set in progress; only a unanimous
    /// terminal outcome is reported as completed or failed.
    pub fn overall(&self, total: u64) -> ProcessingStatus {
        if self.in_progress > 0 || total == 0 {
            ProcessingStatus::InProgress
        } else if self.failed == total {
            ProcessingStatus::Failed
        } else if self.completed == total {
            ProcessingStatus::Completed
        } else {
            ProcessingStatus::InProgress
        }
    }
}
