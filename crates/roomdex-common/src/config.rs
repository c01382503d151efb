//! Application configuration loaded from environment variables and config files.
//!
//! Supports `.env` files for development and environment variables for production.
//! Config precedence: env vars > .env file > config.toml > defaults

use serde::Deserialize;
use std::sync::OnceLock;

static CONFIG: OnceLock<AppConfig> = OnceLock::new();

/// Get the global application configuration.
///
/// # Panics
/// Panics if config has not been initialized via [`init`].
pub fn get() -> &'static AppConfig {
    CONFIG.get().expect("Config not initialized. Call roomdex_common::config::init() first.")
}

/// Initialize the global configuration from environment.
///
/// Should be called once at application startup, before any other code accesses config.
pub fn init() -> Result<&'static AppConfig, config::ConfigError> {
    // Load .env file if present (development)
    let _ = dotenvy::dotenv();

    let cfg = config::Config::builder()
        // Defaults
        .set_default("matrix.server_name", "localhost")?
        .set_default("matrix.keys", Vec::<String>::new())?
        .set_default("crawler.workers", 16)?
        .set_default("crawler.servers", Vec::<String>::new())?
        .set_default("crawler.blocklist", Vec::<String>::new())?
        .set_default("crawler.batch_size", 1_000)?
        .set_default("crawler.rooms_page_limit", 10_000)?
        .set_default("crawler.room_retention_days", 7)?
        .set_default("crawler.server_retention_days", 30)?
        .set_default("public.api_url", "http://localhost:8080")?
        // Optional config file
        .add_source(config::File::with_name("config").required(false))
        // Environment variables (ROOMDEX_MATRIX__SERVER_NAME, ROOMDEX_CRAWLER__WORKERS, etc.)
        .add_source(
            config::Environment::with_prefix("ROOMDEX")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let app_config: AppConfig = cfg.try_deserialize()?;
    Ok(CONFIG.get_or_init(|| app_config))
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub matrix: MatrixConfig,
    pub crawler: CrawlerConfig,
    pub public: PublicConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MatrixConfig {
    /// This instance's server name, used as the origin of signed federation
    /// requests (e.g. "roomdex.example.com").
    pub server_name: String,
    /// Signing keys, one entry per key: `"ed25519 <key_id> <unpadded-base64-seed>"`.
    /// When empty, an ephemeral key is generated at startup.
    pub keys: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CrawlerConfig {
    /// Worker pool size for discovery and room-parsing passes.
    pub workers: usize,
    /// Seed homeservers used to bootstrap discovery.
    pub servers: Vec<String>,
    /// Statically blocklisted server names (immutable at runtime).
    pub blocklist: Vec<String>,
    /// How many rooms to buffer before a batched write to storage.
    pub batch_size: usize,
    /// Page size used for public-rooms since-token pagination.
    pub rooms_page_limit: u32,
    /// Rooms not re-parsed within this many days are purged.
    pub room_retention_days: i64,
    /// Servers offline for longer than this many days are purged.
    pub server_retention_days: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PublicConfig {
    /// Public base URL of this instance, used to materialize avatar HTTP URLs.
    pub api_url: String,
}
