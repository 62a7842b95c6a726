//! The `keyward-api` binary: loads configuration, wires up the cache,
//! blob store and queue backends, and serves the admission HTTP surface
//! until interrupted.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use keyward_api::{build_router, AdmissionState};
use keyward_blobstore::BlobStore;
use keyward_cache::{InMemoryCache, RedisCache};
use keyward_core::rng::OsRngSource;
use keyward_core::{Config, NoopMetrics, TracingMetrics};
use keyward_queue::InMemoryQueue;

#[derive(Debug, Parser)]
#[command(name = "keyward-api")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, env = "KEYWARD_CONFIG", default_value = "keyward.toml")]
    config: std::path::PathBuf,

    /// Use the in-process queue/cache instead of Redis; for local runs and
    /// smoke tests where no external broker is deployed.
    #[arg(long, env = "KEYWARD_STANDALONE", default_value_t = false)]
    standalone: bool,

    /// Emit metrics as tracing events instead of discarding them.
    #[arg(long, env = "KEYWARD_TRACE_METRICS", default_value_t = false)]
    trace_metrics: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_toml(&cli.config)?;

    let cache: Arc<dyn keyward_cache::Cache> = if cli.standalone {
        Arc::new(InMemoryCache::new())
    } else {
        Arc::new(RedisCache::connect(&config.cache_url()).await?)
    };

    let blob_store = BlobStore::open(&config.blob_store.vaults_file_path)?;
    let queue = Arc::new(InMemoryQueue::new());
    let metrics: Arc<dyn keyward_core::Metrics> = if cli.trace_metrics {
        Arc::new(TracingMetrics)
    } else {
        Arc::new(NoopMetrics)
    };

    let listen_port = config.server.listen_port;
    let state = AdmissionState {
        config: Arc::new(config),
        cache,
        queue,
        blob_store: Arc::new(blob_store),
        rng: Arc::new(OsRngSource),
        metrics,
    };

    let router = build_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], listen_port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "admission api listening");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
