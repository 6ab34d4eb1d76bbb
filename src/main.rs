//! Lightning Cache demo worker
//!
//! Stores one value with a short relative TTL, then reads it back once per
//! second and logs what it sees until interrupted.

use std::time::Duration;

use anyhow::Context;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lightning_cache::{CacheConfig, CacheStore, ExpirationOptions};

const DEMO_KEY: &str = "secretKey";
const DEMO_TTL: Duration = Duration::from_secs(5);

/// Main entry point for the demo worker.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Create the cache store and write the demo entry
/// 4. Poll the entry every second until Ctrl+C
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lightning_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Lightning Cache demo");

    let config = CacheConfig::from_env();
    info!(
        "Configuration loaded: data_path={}, max_size={}, max_readers={}, scan_frequency={}s",
        config.data_path.display(),
        config.max_size,
        config.max_readers,
        config.expiration_scan_frequency.as_secs()
    );

    let cache = CacheStore::new(config).context("invalid cache configuration")?;

    cache
        .set_async(
            DEMO_KEY,
            b"secretValue".to_vec(),
            ExpirationOptions::new().with_relative_to_now(DEMO_TTL),
        )
        .await
        .context("failed to store demo entry")?;
    info!(key = DEMO_KEY, ttl_secs = DEMO_TTL.as_secs(), "Demo entry stored");

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let value = cache.get_async(DEMO_KEY).await?;
                let value = value.map(|bytes| String::from_utf8_lossy(&bytes).into_owned());
                info!("Cached value: {:?}", value);
            }
            _ = signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    cache.close();
    info!("Demo shutdown complete");
    Ok(())
}
