use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{info, warn};

pub const DEFAULT_STORE_ID_KEY: &str = "vector-ingest:vector_store_id";

/// Durable home for the resolved vector store id across restarts.
///
/// Implementations swallow their own errors: a failed load means "no id", a
/// failed save is logged.
#[async_trait]
pub trait StoreIdPersistence: Send + Sync {
    async fn load(&self) -> Option<String>;
    async fn save(&self, store_id: &str);
}

/// Keeps the store id under a single Redis key.
pub struct RedisStoreIdPersistence {
    conn: ConnectionManager,
    key: String,
}

impl RedisStoreIdPersistence {
    pub fn new(conn: ConnectionManager, key: impl Into<String>) -> Self {
        Self {
            conn,
            key: key.into(),
        }
    }
}

#[async_trait]
impl StoreIdPersistence for RedisStoreIdPersistence {
    async fn load(&self) -> Option<String> {
        let mut conn = self.conn.clone();
        let result: redis::RedisResult<Option<String>> = conn.get(&self.key).await;
        match result {
            Ok(id) => id.filter(|id| !id.is_empty()),
            Err(e) => {
                warn!("Failed to load persisted vector store id: {e}");
                None
            }
        }
    }

    async fn save(&self, store_id: &str) {
        let mut conn = self.conn.clone();
        let result: redis::RedisResult<()> = conn.set(&self.key, store_id).await;
        match result {
            Ok(()) => info!("Persisted vector store id {store_id}"),
            Err(e) => warn!("Failed to persist vector store id {store_id}: {e}"),
        }
    }
}
