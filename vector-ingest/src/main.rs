mod activity;
mod app;
mod auth;
mod config;
mod gateway;
mod models;
mod routes;
mod vector_store;

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use activity::memory::MemoryActivityBackend;
use activity::redis::RedisActivityBackend;
use activity::{ActivityBackend, ActivityCache};
use app::AppState;
use config::load_settings_from_path;
use gateway::openai::OpenAiGateway;
use vector_store::persistence::RedisStoreIdPersistence;
use vector_store::{VectorStoreClient, VectorStoreConfig};

/// Config file path, overridable with `VECTOR_INGEST_CONFIG`.
const DEFAULT_CONFIG_PATH: &str = "vector-ingest.toml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting vector-ingest server...");

    // Load configuration.
    let config_path =
        std::env::var("VECTOR_INGEST_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let settings = load_settings_from_path(&config_path)?;
    info!(
        "Configuration loaded: environment={}, host={}, port={}",
        settings.environment, settings.host, settings.port
    );
    if settings.bypass_auth_mode {
        warn!(
            "Auth bypass enabled; all requests run as {}",
            settings.dev_user_id
        );
    }

    // Initialize the hosted vector store gateway.
    let gateway = Arc::new(OpenAiGateway::new(
        &settings.gateway_base_url,
        &settings.openai_api_key,
        settings.request_timeout_secs,
    ));
    info!("Gateway initialized: {}", settings.gateway_base_url);

    // Connect Redis, falling back to in-process activity storage.
    let redis = if settings.redis_enabled {
        match RedisActivityBackend::connect(&settings.redis_url).await {
            Ok(backend) => Some(backend),
            Err(e) => {
                warn!("Redis unavailable ({e}); using in-memory activity cache");
                None
            }
        }
    } else {
        None
    };

    let mut client = VectorStoreClient::new(
        gateway,
        VectorStoreConfig {
            name: settings.vector_store_name.clone(),
            configured_id: settings.vector_store_id.clone(),
            upload_concurrency: settings.upload_concurrency,
        },
    );
    let backend: Arc<dyn ActivityBackend> = match redis {
        Some(backend) => {
            client = client.with_persistence(Arc::new(RedisStoreIdPersistence::new(
                backend.connection(),
                settings.store_id_key.clone(),
            )));
            Arc::new(backend)
        }
        None => Arc::new(MemoryActivityBackend::new()),
    };
    let activity = ActivityCache::new(
        backend,
        settings.activity_max_entries,
        settings.activity_ttl,
    );
    info!(
        "Vector store client initialized (store name={}, activity backend={})",
        client.store_name(),
        activity.backend_name()
    );

    // Build application state.
    let state = Arc::new(AppState {
        settings: settings.clone(),
        client: Arc::new(client),
        activity: Arc::new(activity),
    });

    // Build router.
    let app = routes::build_router(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    // Start server.
    let addr: SocketAddr = format!("{}:{}", settings.host, settings.port).parse()?;
    info!("Listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
