use std::sync::Arc;

use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};

use hivemind::config::HivemindConfig;
use hivemind::grpc::GrpcServer;
use hivemind::ratelimit::clock::SystemClock;
use hivemind::ratelimit::store::{CounterStoreRouter, RedisCounterStore};
use hivemind::reloader;
use hivemind::service::RateLimitService;
use hivemind::watcher::{FileSnapshotProvider, SnapshotProvider};

/// Hivemind - Distributed rate limiting service for Envoy Proxy
#[derive(Parser, Debug)]
#[command(name = "hivemind")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a bootstrap YAML configuration file
    #[arg(short = 'c', long = "config")]
    config: Option<String>,

    /// gRPC server address
    #[arg(short = 'a', long = "addr")]
    addr: Option<String>,

    /// Directory of per-domain rate limit rule files, watched for changes
    #[arg(long = "runtime-config-dir")]
    runtime_config_dir: Option<String>,

    /// Redis connection URL for the counter store
    #[arg(long = "redis-url")]
    redis_url: Option<String>,

    /// Enable service-wide shadow mode: evaluate and record, never block
    #[arg(long = "shadow-mode", default_value = "false")]
    shadow_mode: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .init();

    info!("Starting Hivemind Rate Limiting Service");
    info!(version = env!("CARGO_PKG_VERSION"));

    let mut config = match &args.config {
        Some(path) => HivemindConfig::from_file(path)?,
        None => HivemindConfig::default(),
    };

    if let Some(addr) = &args.addr {
        config.server.grpc_addr = addr.parse()?;
    }
    if let Some(dir) = &args.runtime_config_dir {
        config.rate_limiting.runtime_config_dir = dir.clone();
    }
    if let Some(url) = &args.redis_url {
        config.redis.url = url.clone();
    }
    config.rate_limiting.shadow_mode |= args.shadow_mode;

    info!(
        grpc_addr = %config.server.grpc_addr,
        runtime_config_dir = %config.rate_limiting.runtime_config_dir,
        shadow_mode = config.rate_limiting.shadow_mode,
        "Configuration loaded"
    );

    PrometheusBuilder::new()
        .with_http_listener(config.server.metrics_addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    info!(addr = %config.server.metrics_addr, "Metrics exporter listening");

    let store = build_counter_store_router(&config).await?;
    let service = RateLimitService::new(store, Arc::new(SystemClock), config.rate_limiting.shadow_mode);

    let file_provider = FileSnapshotProvider::new(&config.rate_limiting.runtime_config_dir)
        .unwrap_or_else(|e| panic!("failed to watch {}: {e}", config.rate_limiting.runtime_config_dir));
    let provider: Arc<dyn SnapshotProvider> = Arc::new(file_provider);

    let prefix = config.rate_limiting.runtime_config_prefix.clone();
    if !reloader::reload_once(provider.as_ref(), &service, prefix.as_deref()).await {
        warn!("starting with no rate limit configuration loaded; every request will be rejected until one loads");
    }

    let shutdown = CancellationToken::new();
    let reloader_handle = reloader::spawn(provider, service.clone(), prefix, shutdown.clone());

    let grpc_server = GrpcServer::new(config.server.grpc_addr, service);

    info!(addr = %config.server.grpc_addr, "Starting gRPC server");
    let result = grpc_server.serve_with_shutdown(shutdown_signal()).await;

    shutdown.cancel();
    let _ = reloader_handle.await;

    if let Err(e) = &result {
        error!(error = %e, "gRPC server exited with an error");
    }
    result?;

    info!("Hivemind Rate Limiting Service stopped");
    Ok(())
}

async fn build_counter_store_router(config: &HivemindConfig) -> anyhow::Result<CounterStoreRouter> {
    let default_store = RedisCounterStore::connect(&config.redis.url).await?;

    let mut router = CounterStoreRouter::new(Arc::new(default_store));

    if let Some(url) = &config.redis.per_second_url {
        let per_second_store = RedisCounterStore::connect(url).await?;
        router = router.with_per_second(Arc::new(per_second_store));
    }

    Ok(router)
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
