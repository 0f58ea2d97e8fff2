use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{ActivityBackend, ActivityError};

struct Entry {
    values: VecDeque<String>,
    expires_at: Instant,
}

/// In-process activity backend, used when Redis is disabled or unreachable.
#[derive(Default)]
pub struct MemoryActivityBackend {
    lists: Mutex<HashMap<String, Entry>>,
}

impl MemoryActivityBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ActivityBackend for MemoryActivityBackend {
    async fn push(
        &self,
        key: &str,
        value: String,
        max_entries: usize,
        ttl: Duration,
    ) -> Result<(), ActivityError> {
        let now = Instant::now();
        let mut lists = self.lists.lock().await;
        let entry = lists.entry(key.to_string()).or_insert_with(|| Entry {
            values: VecDeque::new(),
            expires_at: now + ttl,
        });
        if entry.expires_at <= now {
            entry.values.clear();
        }
        entry.values.push_front(value);
        entry.values.truncate(max_entries);
        entry.expires_at = now + ttl;
        Ok(())
    }

    async fn recent(&self, key: &str, limit: usize) -> Result<Vec<String>, ActivityError> {
        let mut lists = self.lists.lock().await;
        let expired = match lists.get(key) {
            Some(entry) => entry.expires_at <= Instant::now(),
            None => return Ok(Vec::new()),
        };
        if expired {
            lists.remove(key);
            return Ok(Vec::new());
        }
        Ok(lists
            .get(key)
            .map(|entry| entry.values.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
