pub mod memory;
pub mod redis;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::activity::{SearchRecord, UploadRecord};

pub const DEFAULT_MAX_ENTRIES: usize = 50;
pub const DEFAULT_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, Error)]
pub enum ActivityError {
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Bounded, expiring per-key lists of JSON entries, newest first.
#[async_trait]
pub trait ActivityBackend: Send + Sync {
    /// Prepend `value`, keep at most `max_entries`, and refresh the key's expiry.
    async fn push(
        &self,
        key: &str,
        value: String,
        max_entries: usize,
        ttl: Duration,
    ) -> Result<(), ActivityError>;

    /// Up to `limit` most recent entries.
    async fn recent(&self, key: &str, limit: usize) -> Result<Vec<String>, ActivityError>;

    /// Return the backend name for logs.
    fn name(&self) -> &str;
}

/// Per-user record of recent uploads and searches.
///
/// Every operation is fail-open: backend errors are logged and turn into
/// no-ops or empty results.
pub struct ActivityCache {
    backend: Arc<dyn ActivityBackend>,
    max_entries: usize,
    ttl: Duration,
}

impl ActivityCache {
    pub fn new(backend: Arc<dyn ActivityBackend>, max_entries: usize, ttl: Duration) -> Self {
        Self {
            backend,
            max_entries: max_entries.max(1),
            ttl,
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub async fn record_upload(&self, user_id: &str, record: &UploadRecord) {
        self.push(&uploads_key(user_id), record).await;
    }

    pub async fn record_search(&self, user_id: &str, record: &SearchRecord) {
        self.push(&searches_key(user_id), record).await;
    }

    pub async fn recent_uploads(&self, user_id: &str, limit: usize) -> Vec<UploadRecord> {
        self.recent(&uploads_key(user_id), limit).await
    }

    pub async fn recent_searches(&self, user_id: &str, limit: usize) -> Vec<SearchRecord> {
        self.recent(&searches_key(user_id), limit).await
    }

    async fn push<T: Serialize>(&self, key: &str, record: &T) {
        let value = match serde_json::to_string(record) {
            Ok(value) => value,
            Err(e) => {
                warn!("Failed to encode activity record for {key}: {e}");
                return;
            }
        };
        if let Err(e) = self
            .backend
            .push(key, value, self.max_entries, self.ttl)
            .await
        {
            warn!(
                "Activity cache ({}) write failed for {key}: {e}",
                self.backend.name()
            );
        }
    }

    async fn recent<T: DeserializeOwned>(&self, key: &str, limit: usize) -> Vec<T> {
        let limit = limit.min(self.max_entries);
        if limit == 0 {
            return Vec::new();
        }
        match self.backend.recent(key, limit).await {
            Ok(entries) => entries
                .iter()
                .filter_map(|raw| match serde_json::from_str(raw) {
                    Ok(record) => Some(record),
                    Err(e) => {
                        debug!("Skipping unreadable activity entry in {key}: {e}");
                        None
                    }
                })
                .collect(),
            Err(e) => {
                warn!(
                    "Activity cache ({}) read failed for {key}: {e}",
                    self.backend.name()
                );
                Vec::new()
            }
        }
    }
}

fn uploads_key(user_id: &str) -> String {
    format!("activity:{user_id}:uploads")
}

fn searches_key(user_id: &str) -> String {
    format!("activity:{user_id}:searches")
}
