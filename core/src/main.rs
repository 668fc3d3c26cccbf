// DefenderLink Core
// Aggregates third-party threat-intelligence signals into one risk verdict.

mod config;
mod feeds;
mod http;
mod providers;
mod risk;
mod scan;
mod telemetry;
mod types;

use std::sync::Arc;

use log::{error, info};
use tokio::sync::oneshot;

use crate::config::CoreConfig;
use crate::feeds::FeedCache;
use crate::http::ApiState;
use crate::scan::ScanPipeline;
use crate::telemetry::TelemetryStore;

fn main() {
    let _ = env_logger::try_init();

    if let Err(error) = run() {
        error!("[CORE] {}", error);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        tokio::spawn(async move {
            if let Err(error) = tokio::signal::ctrl_c().await {
                error!("[CORE] Failed to listen for shutdown: {}", error);
            }
            let _ = shutdown_tx.send(());
        });

        run_until_shutdown(shutdown_rx).await
    })
}

async fn run_until_shutdown(
    shutdown_rx: oneshot::Receiver<()>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = Arc::new(CoreConfig::from_env());
    let telemetry = Arc::new(TelemetryStore::new());
    let feeds = Arc::new(FeedCache::new(config.feed_timeout)?);
    let pipeline = Arc::new(ScanPipeline::new(
        (*config).clone(),
        Arc::clone(&feeds),
        Arc::clone(&telemetry),
    )?);

    // Warm the feed snapshots so the first request does not pay for the
    // initial full fetch.
    {
        let feeds = Arc::clone(&feeds);
        tokio::spawn(async move {
            feeds.refresh().await;
        });
    }

    let state = ApiState {
        pipeline,
        telemetry,
        config: Arc::clone(&config),
    };

    let addr = config.api_addr.clone();
    info!("[API] Listening on {}", addr);
    let api_handle = tokio::spawn(async move {
        if let Err(error) = http::serve(addr, state).await {
            error!("[API] Server error: {}", error);
        }
    });

    let _ = shutdown_rx.await;
    info!("[CORE] Shutting down gracefully");
    api_handle.abort();

    Ok(())
}
