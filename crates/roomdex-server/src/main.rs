//! # Roomdex
//!
//! Crawler binary: wires configuration, signing keys, the federation client
//! stack, and the crawler, then runs the requested pass.
//!
//! Storage here is the in-memory repository; durable backends plug in behind
//! the same `DataRepository` trait at wiring time.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;

use roomdex_crawler::crawler::{Crawler, CrawlerConfig};
use roomdex_crawler::media::AvatarProxy;
use roomdex_crawler::repository::memory::InMemoryRepository;
use roomdex_crawler::{Blocklist, Validator};
use roomdex_federation::{FederationClient, ServerLocator, keys};

#[derive(Parser)]
#[command(name = "roomdex", version, about = "Search engine crawler for Matrix public room directories")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one server discovery pass.
    Discover {
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Run one room parsing pass.
    Parse {
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Run a full cycle: discovery followed by room parsing.
    Crawl {
        #[arg(long)]
        workers: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = roomdex_common::config::init()?;

    // Initialize tracing (structured logging)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "roomdex=debug".into()),
        )
        .with_target(true)
        .init();

    tracing::info!("Starting Roomdex v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Federation origin: {}", config.matrix.server_name);

    // === Signing keys ===
    let signing_keys = Arc::new(keys::load_signing_keys(&config.matrix.keys)?);
    tracing::info!(
        "Loaded {} signing key(s): {}",
        signing_keys.len(),
        signing_keys.iter().map(|k| k.key_id.as_str()).collect::<Vec<_>>().join(", ")
    );

    // === Federation stack ===
    // Fresh resolutions feed a background re-discovery queue.
    let (rediscover_tx, mut rediscover_rx) = mpsc::unbounded_channel::<String>();
    let locator = Arc::new(ServerLocator::new().with_rediscovery(rediscover_tx));
    let federation = Arc::new(FederationClient::new(
        config.matrix.server_name.clone(),
        signing_keys,
        locator,
    ));

    // === Crawler ===
    let blocklist = Arc::new(Blocklist::new(&config.crawler.blocklist));
    let validator = Arc::new(Validator::new(
        federation.clone(),
        blocklist.clone(),
        config.matrix.server_name.clone(),
    ));
    let repository = Arc::new(InMemoryRepository::new(config.crawler.batch_size));
    let media = Arc::new(AvatarProxy::new(&config.public.api_url));
    let crawler = Crawler::new(
        repository,
        federation,
        validator,
        blocklist,
        media,
        CrawlerConfig {
            workers: config.crawler.workers,
            servers: config.crawler.servers.clone(),
            rooms_page_limit: config.crawler.rooms_page_limit,
            room_retention_days: config.crawler.room_retention_days,
            server_retention_days: config.crawler.server_retention_days,
        },
    );

    // Drain locator re-discoveries into ad hoc registrations. Detached: the
    // queue outlives any single pass.
    {
        let crawler = crawler.clone();
        tokio::spawn(async move {
            while let Some(name) = rediscover_rx.recv().await {
                crawler.add_servers(vec![name]);
            }
        });
    }

    match cli.command {
        Command::Discover { workers } => {
            let workers = workers.unwrap_or(config.crawler.workers);
            crawler.discover_servers(workers, None).await;
        }
        Command::Parse { workers } => {
            let workers = workers.unwrap_or(config.crawler.workers);
            crawler.parse_rooms(workers).await;
        }
        Command::Crawl { workers } => {
            let workers = workers.unwrap_or(config.crawler.workers);
            crawler.discover_servers(workers, None).await;
            crawler.parse_rooms(workers).await;
        }
    }

    Ok(())
}
