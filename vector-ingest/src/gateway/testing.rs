//! In-process gateway used by unit tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use super::{FilePage, FileUpload, GatewayError, VectorStoreGateway};
use crate::models::api::SearchHit;
use crate::models::status::{
    BatchStatus, FileCounts, FileStatus, ProcessingStatus, StoreLifecycle, VectorStore,
};

#[derive(Default)]
pub struct FakeState {
    pub stores: HashMap<String, VectorStore>,
    pub fail_create_store: bool,
    pub create_store_calls: usize,
    pub create_store_delay: Option<Duration>,

    pub failing_uploads: HashSet<String>,
    pub uploaded: Vec<String>,

    pub fail_batch: bool,
    pub batches: Vec<Vec<String>>,
    /// Scripted responses per batch; the last entry repeats once the queue drains.
    pub batch_script: HashMap<String, VecDeque<Result<BatchStatus, String>>>,
    pub retrieve_batch_calls: usize,
    pub retrieve_batch_delay: Option<Duration>,

    pub file_statuses: HashMap<String, FileStatus>,
    pub failing_file_lookups: HashSet<String>,
    pub lookups_in_flight: usize,
    pub max_lookups_in_flight: usize,

    pub listed: Vec<FileStatus>,
    pub duplicate_cursor: bool,

    pub missing_store_files: HashSet<String>,
    pub missing_files: HashSet<String>,
    pub deleted_store_files: Vec<String>,
    pub deleted_files: Vec<String>,

    pub search_hits: Vec<SearchHit>,

    next_id: usize,
}

impl FakeState {
    fn next(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }
}

#[derive(Default)]
pub struct FakeGateway {
    pub state: Mutex<FakeState>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_store(self, id: &str) -> Self {
        self.state.lock().unwrap().stores.insert(
            id.to_string(),
            VectorStore {
                id: id.to_string(),
                name: Some("existing".to_string()),
                lifecycle: StoreLifecycle::Ready,
                file_counts: FileCounts::default(),
            },
        );
        self
    }

    pub fn script_batch(&self, batch_id: &str, responses: Vec<Result<BatchStatus, String>>) {
        self.state
            .lock()
            .unwrap()
            .batch_script
            .insert(batch_id.to_string(), responses.into());
    }

    pub fn set_file(&self, id: &str, status: ProcessingStatus) {
        self.state.lock().unwrap().file_statuses.insert(
            id.to_string(),
            FileStatus {
                id: id.to_string(),
                status,
                error: None,
            },
        );
    }

    pub fn uploaded(&self) -> Vec<String> {
        self.state.lock().unwrap().uploaded.clone()
    }

    pub fn create_store_calls(&self) -> usize {
        self.state.lock().unwrap().create_store_calls
    }
}

pub fn batch(id: &str, status: ProcessingStatus, counts: FileCounts) -> BatchStatus {
    BatchStatus {
        batch_id: id.to_string(),
        status,
        file_counts: counts,
    }
}

fn upstream(msg: &str) -> GatewayError {
    GatewayError::Api {
        status: 500,
        body: msg.to_string(),
    }
}

#[async_trait]
impl VectorStoreGateway for FakeGateway {
    async fn retrieve_store(&self, store_id: &str) -> Result<VectorStore, GatewayError> {
        self.state
            .lock()
            .unwrap()
            .stores
            .get(store_id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("vector store {store_id}")))
    }

    async fn create_store(&self, name: &str) -> Result<VectorStore, GatewayError> {
        let delay = {
            let mut state = self.state.lock().unwrap();
            state.create_store_calls += 1;
            state.create_store_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        if state.fail_create_store {
            return Err(upstream("create failed"));
        }
        let id = state.next("vs-new");
        let store = VectorStore {
            id: id.clone(),
            name: Some(name.to_string()),
            lifecycle: StoreLifecycle::Ready,
            file_counts: FileCounts::default(),
        };
        state.stores.insert(id, store.clone());
        Ok(store)
    }

    async fn upload_file(&self, file: &FileUpload) -> Result<String, GatewayError> {
        // Yield so concurrent uploads interleave.
        tokio::task::yield_now().await;
        let mut state = self.state.lock().unwrap();
        if state.failing_uploads.contains(&file.filename) {
            return Err(upstream(&format!("upload of {} rejected", file.filename)));
        }
        state.uploaded.push(file.filename.clone());
        Ok(state.next("file"))
    }

    async fn create_file_batch(
        &self,
        _store_id: &str,
        file_ids: &[String],
    ) -> Result<BatchStatus, GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.batches.push(file_ids.to_vec());
        if state.fail_batch {
            return Err(upstream("batch failed"));
        }
        let id = state.next("batch");
        let counts = FileCounts {
            in_progress: file_ids.len() as u64,
            total: file_ids.len() as u64,
            ..Default::default()
        };
        Ok(batch(&id, ProcessingStatus::InProgress, counts))
    }

    async fn retrieve_batch(
        &self,
        _store_id: &str,
        batch_id: &str,
    ) -> Result<BatchStatus, GatewayError> {
        let delay = {
            let mut state = self.state.lock().unwrap();
            state.retrieve_batch_calls += 1;
            state.retrieve_batch_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        let queue = state
            .batch_script
            .get_mut(batch_id)
            .ok_or_else(|| GatewayError::NotFound(format!("batch {batch_id}")))?;
        let next = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        match next {
            Some(Ok(status)) => Ok(status),
            Some(Err(msg)) => Err(upstream(&msg)),
            None => Err(GatewayError::NotFound(format!("batch {batch_id}"))),
        }
    }

    async fn retrieve_store_file(
        &self,
        _store_id: &str,
        file_id: &str,
    ) -> Result<FileStatus, GatewayError> {
        {
            let mut state = self.state.lock().unwrap();
            state.lookups_in_flight += 1;
            state.max_lookups_in_flight = state.max_lookups_in_flight.max(state.lookups_in_flight);
        }
        tokio::task::yield_now().await;
        let mut state = self.state.lock().unwrap();
        state.lookups_in_flight -= 1;
        if state.failing_file_lookups.contains(file_id) {
            return Err(upstream("lookup failed"));
        }
        state
            .file_statuses
            .get(file_id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("file {file_id}")))
    }

    async fn list_store_files(
        &self,
        _store_id: &str,
        after: Option<&str>,
        limit: u32,
    ) -> Result<FilePage, GatewayError> {
        let state = self.state.lock().unwrap();
        let start = match after {
            Some(cursor) if !state.duplicate_cursor => state
                .listed
                .iter()
                .position(|f| f.id == cursor)
                .map(|i| i + 1)
                .unwrap_or(state.listed.len()),
            _ => 0,
        };
        let end = (start + limit as usize).min(state.listed.len());
        let files = state.listed[start..end].to_vec();
        Ok(FilePage {
            last_id: files.last().map(|f| f.id.clone()),
            has_more: state.duplicate_cursor || end < state.listed.len(),
            files,
        })
    }

    async fn delete_store_file(&self, _store_id: &str, file_id: &str) -> Result<(), GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.deleted_store_files.push(file_id.to_string());
        if state.missing_store_files.contains(file_id) {
            return Err(GatewayError::NotFound(format!("file {file_id}")));
        }
        Ok(())
    }

    async fn delete_file(&self, file_id: &str) -> Result<(), GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.deleted_files.push(file_id.to_string());
        if state.missing_files.contains(file_id) {
            return Err(GatewayError::NotFound(format!("file {file_id}")));
        }
        Ok(())
    }

    async fn search(
        &self,
        _store_id: &str,
        _query: &str,
        max_results: u32,
    ) -> Result<Vec<SearchHit>, GatewayError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .search_hits
            .iter()
            .take(max_results as usize)
            .cloned()
            .collect())
    }
}
