use ::redis::aio::ConnectionManager;
use ::redis::AsyncCommands;
use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

use super::{ActivityBackend, ActivityError};

/// Redis list backend: `LPUSH` + `LTRIM` + `EXPIRE` in one atomic pipeline.
pub struct RedisActivityBackend {
    conn: ConnectionManager,
}

impl RedisActivityBackend {
    pub async fn connect(url: &str) -> Result<Self, ActivityError> {
        let client = ::redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        info!("Connected to Redis activity cache");
        Ok(Self { conn })
    }

    /// Shared connection handle, e.g. for store-id persistence.
    pub fn connection(&self) -> ConnectionManager {
        self.conn.clone()
    }
}

#[async_trait]
impl ActivityBackend for RedisActivityBackend {
    async fn push(
        &self,
        key: &str,
        value: String,
        max_entries: usize,
        ttl: Duration,
    ) -> Result<(), ActivityError> {
        let mut conn = self.conn.clone();
        let stop = max_entries.max(1) as isize - 1;
        let _: () = ::redis::pipe()
            .atomic()
            .lpush(key, value)
            .ignore()
            .ltrim(key, 0, stop)
            .ignore()
            .expire(key, ttl.as_secs() as i64)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn recent(&self, key: &str, limit: usize) -> Result<Vec<String>, ActivityError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let values: Vec<String> = conn.lrange(key, 0, limit as isize - 1).await?;
        Ok(values)
    }

    fn name(&self) -> &str {
        "redis"
    }
}
