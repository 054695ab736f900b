//! Server Binary - HTTP API in front of the orchestrator
//!
//! Wires up:
//! - The provider registry (local ffmpeg provider)
//! - A job and preset store picked by `STORE` (memory, redis, dynamodb)
//! - The HTTP adapter
//!
//! Environment Variables:
//! - ADDR / PORT: bind address
//! - STORE: memory | redis | dynamodb
//! - REDIS_URL: Redis connection URL
//! - DYNAMODB_TABLE: DynamoDB table for jobs and presets
//! - PROVIDER_FFMPEG_WORK_DIR: scratch directory for local jobs

use maestro::adapters::{ffmpeg, http, memory::MemoryStore};
use maestro::config::{Config, StoreKind};
use maestro::ports::repository::{JobRepository, PresetRepository};
use maestro::{OrchestratorService, ProviderRegistry};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    // 1. Providers
    let mut registry = ProviderRegistry::new();
    if let Err(e) = registry.register(ffmpeg::NAME, ffmpeg::factory) {
        error!("Failed to register provider: {}", e);
        std::process::exit(1);
    }

    // 2. Store
    match config.store {
        StoreKind::Memory => {
            let store = MemoryStore::new(config.job_retention);
            spawn_purge(store.clone());
            serve(config, registry, store.clone(), store).await
        }
        StoreKind::Redis => redis_store(config, registry).await,
        StoreKind::DynamoDb => dynamodb_store(config, registry).await,
    }
}

fn spawn_purge(store: MemoryStore) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            let purged = store.purge_expired();
            if purged > 0 {
                info!(purged, "Expired jobs purged");
            }
        }
    });
}

#[cfg(feature = "redis")]
async fn redis_store(config: Config, registry: ProviderRegistry) {
    use maestro::adapters::redis::RedisPool;

    let pool = match RedisPool::new(&config.redis_url, config.job_retention) {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to connect to Redis: {}", e);
            std::process::exit(1);
        }
    };
    serve(config, registry, pool.clone(), pool).await
}

#[cfg(not(feature = "redis"))]
async fn redis_store(_config: Config, _registry: ProviderRegistry) {
    error!("STORE=redis needs the `redis` feature");
    std::process::exit(1);
}

#[cfg(feature = "aws")]
async fn dynamodb_store(config: Config, registry: ProviderRegistry) {
    use maestro::adapters::aws::DynamoAdapter;

    let Some(table) = config.dynamodb_table.clone() else {
        error!("DYNAMODB_TABLE is required");
        std::process::exit(1);
    };
    let aws = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let client = aws_sdk_dynamodb::Client::new(&aws);
    let adapter = DynamoAdapter::new(client, table, config.job_retention);
    serve(config, registry, adapter.clone(), adapter).await
}

#[cfg(not(feature = "aws"))]
async fn dynamodb_store(_config: Config, _registry: ProviderRegistry) {
    error!("STORE=dynamodb needs the `aws` feature");
    std::process::exit(1);
}

async fn serve<J, P>(config: Config, registry: ProviderRegistry, jobs: J, presets: P)
where
    J: JobRepository + 'static,
    P: PresetRepository + 'static,
{
    let bind = format!("{}:{}", config.addr, config.port);
    let orchestrator = Arc::new(OrchestratorService::new(registry, config, jobs, presets));
    let app = http::router(orchestrator);

    let listener = match tokio::net::TcpListener::bind(&bind).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", bind, e);
            std::process::exit(1);
        }
    };
    info!("Listening at {}", bind);
    if let Err(e) = axum::serve(listener, app).await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
}
