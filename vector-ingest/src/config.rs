use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::vector_store::PollConfig;

pub const MIB: u64 = 1024 * 1024;

pub const DEFAULT_ALLOWED_MIME_TYPES: &[&str] = &[
    "text/plain",
    "text/markdown",
    "text/csv",
    "application/pdf",
    "application/json",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
];

// ──────────────────────────── TOML structure ────────────────────────────

#[derive(Debug, Deserialize, Clone)]
pub struct TomlConfig {
    pub api: ApiConfig,
    #[serde(default)]
    pub service: ServiceConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub redis: RedisConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    #[serde(default = "default_environment")]
    pub environment: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
        }
    }
}

fn default_environment() -> String {
    "development".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_algorithm: String,
    #[serde(default)]
    pub bypass_auth_mode: bool,
    #[serde(default = "default_dev_user_id")]
    pub dev_user_id: String,
}

fn default_dev_user_id() -> String {
    "dev_user".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_vector_store_name")]
    pub vector_store_name: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_store_id_key")]
    pub store_id_key: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            vector_store_name: default_vector_store_name(),
            request_timeout_secs: default_request_timeout_secs(),
            store_id_key: default_store_id_key(),
        }
    }
}

fn default_base_url() -> String {
    crate::gateway::openai::DEFAULT_BASE_URL.to_string()
}
fn default_vector_store_name() -> String {
    "knowledge-base".to_string()
}
fn default_request_timeout_secs() -> u64 {
    300
}
fn default_store_id_key() -> String {
    crate::vector_store::persistence::DEFAULT_STORE_ID_KEY.to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_max_file_size_bytes")]
    pub max_file_size_bytes: u64,
    #[serde(default = "default_max_files_per_batch")]
    pub max_files_per_batch: usize,
    #[serde(default = "default_upload_concurrency")]
    pub upload_concurrency: usize,
    #[serde(default = "default_allowed_mime_types")]
    pub allowed_mime_types: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_file_size_bytes: default_max_file_size_bytes(),
            max_files_per_batch: default_max_files_per_batch(),
            upload_concurrency: default_upload_concurrency(),
            allowed_mime_types: default_allowed_mime_types(),
        }
    }
}

fn default_max_file_size_bytes() -> u64 {
    512 * MIB
}
fn default_max_files_per_batch() -> usize {
    20
}
fn default_upload_concurrency() -> usize {
    4
}
fn default_allowed_mime_types() -> Vec<String> {
    DEFAULT_ALLOWED_MIME_TYPES
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct PollingConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_poll_max_wait_ms")]
    pub max_wait_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval_ms(),
            max_wait_ms: default_poll_max_wait_ms(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    2_000
}
fn default_poll_max_wait_ms() -> u64 {
    300_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_redis_url")]
    pub url: String,
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_redis_url(),
            max_entries: default_max_entries(),
            ttl_secs: default_ttl_secs(),
        }
    }
}

fn default_redis_url() -> String {
    "redis://localhost:6379/0".to_string()
}
fn default_max_entries() -> usize {
    crate::activity::DEFAULT_MAX_ENTRIES
}
fn default_ttl_secs() -> u64 {
    crate::activity::DEFAULT_TTL.as_secs()
}

// ──────────────────────────── Resolved Settings ────────────────────────────

/// Flat settings structure resolved from TOML + environment variables.
#[derive(Debug, Clone)]
pub struct Settings {
    // API
    pub host: String,
    pub port: u16,
    pub environment: String,

    // Auth
    pub jwt_algorithm: String,
    pub jwt_secret_key: String,
    pub bypass_auth_mode: bool,
    pub dev_user_id: String,

    // Gateway
    pub openai_api_key: String,
    pub gateway_base_url: String,
    pub vector_store_name: String,
    pub vector_store_id: Option<String>,
    pub request_timeout_secs: u64,
    pub store_id_key: String,

    // Ingest
    pub max_file_size_bytes: u64,
    pub max_files_per_batch: usize,
    pub upload_concurrency: usize,
    pub allowed_mime_types: Vec<String>,

    // Polling
    pub poll_interval: Duration,
    pub poll_max_wait: Duration,

    // Redis
    pub redis_enabled: bool,
    pub redis_url: String,
    pub activity_max_entries: usize,
    pub activity_ttl: Duration,
}

impl Settings {
    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            interval: self.poll_interval,
            max_wait: self.poll_max_wait,
        }
    }

    /// Largest multipart body the upload route accepts.
    pub fn max_request_bytes(&self) -> usize {
        let total = self
            .max_file_size_bytes
            .saturating_mul(self.max_files_per_batch as u64)
            .saturating_add(MIB);
        usize::try_from(total).unwrap_or(usize::MAX)
    }
}

/// Load settings from a given TOML path. Useful for testing.
pub fn load_settings_from_path(path: impl AsRef<Path>) -> anyhow::Result<Settings> {
    // Load .env if present (ignore errors)
    let _ = dotenvy::dotenv();

    let content = std::fs::read_to_string(path.as_ref())?;
    let config: TomlConfig = toml::from_str(&content)?;
    resolve_settings(config, |key| std::env::var(key).ok())
}

/// Combine a parsed TOML config with environment lookups.
pub fn resolve_settings(
    config: TomlConfig,
    env: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<Settings> {
    let jwt_secret_key = env("JWT_SECRET_KEY").unwrap_or_else(|| "dev-secret-key".to_string());
    if !config.auth.bypass_auth_mode && jwt_secret_key == "dev-secret-key" {
        anyhow::bail!("JWT_SECRET_KEY is required when bypass_auth_mode is disabled");
    }

    let openai_api_key = env("OPENAI_API_KEY")
        .filter(|k| !k.is_empty())
        .ok_or_else(|| anyhow::anyhow!("OPENAI_API_KEY environment variable is required"))?;

    let vector_store_id = env("VECTOR_STORE_ID").filter(|id| !id.trim().is_empty());
    let redis_url = env("REDIS_URL").unwrap_or(config.redis.url);

    if config.ingest.max_files_per_batch == 0 {
        anyhow::bail!("ingest.max_files_per_batch must be at least 1");
    }
    if config.ingest.allowed_mime_types.is_empty() {
        anyhow::bail!("ingest.allowed_mime_types must not be empty");
    }

    Ok(Settings {
        host: config.api.host,
        port: config.api.port,
        environment: config.service.environment,
        jwt_algorithm: config.auth.jwt_algorithm,
        jwt_secret_key,
        bypass_auth_mode: config.auth.bypass_auth_mode,
        dev_user_id: config.auth.dev_user_id,
        openai_api_key,
        gateway_base_url: config.gateway.base_url,
        vector_store_name: config.gateway.vector_store_name,
        vector_store_id,
        request_timeout_secs: config.gateway.request_timeout_secs,
        store_id_key: config.gateway.store_id_key,
        max_file_size_bytes: config.ingest.max_file_size_bytes,
        max_files_per_batch: config.ingest.max_files_per_batch,
        upload_concurrency: config.ingest.upload_concurrency.max(1),
        allowed_mime_types: config
            .ingest
            .allowed_mime_types
            .into_iter()
            .map(|m| m.trim().to_ascii_lowercase())
            .collect(),
        poll_interval: Duration::from_millis(config.polling.interval_ms),
        poll_max_wait: Duration::from_millis(config.polling.max_wait_ms),
        redis_enabled: config.redis.enabled,
        redis_url,
        activity_max_entries: config.redis.max_entries,
        activity_ttl: Duration::from_secs(config.redis.ttl_secs),
    })
}
