use std::sync::Arc;

use crate::activity::ActivityCache;
use crate::config::Settings;
use crate::vector_store::VectorStoreClient;

/// Shared application state passed to all route handlers.
pub struct AppState {
    pub settings: Settings,
    pub client: Arc<VectorStoreClient>,
    pub activity: Arc<ActivityCache>,
}
