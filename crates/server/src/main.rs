//! FRKB server binary.

use anyhow::{Context, Result};
use clap::Parser;
use figment::providers::{Env, Format, Toml};
use figment::Figment;
use frkb_core::config::AppConfig;
use frkb_server::{create_router, AppState};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// FRKB - fingerprint set synchronization server
#[derive(Parser, Debug)]
#[command(name = "frkbd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "FRKB_CONFIG", default_value = "config/server.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("FRKB v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration (file is optional, env vars can provide/override everything)
    let config_path = std::path::Path::new(&args.config);
    let mut figment = Figment::new();
    let has_config_file = config_path.exists();

    if has_config_file {
        tracing::info!(config_path = %args.config, "Loading configuration from file");
        figment = figment.merge(Toml::file(&args.config));
    } else {
        tracing::debug!("No config file found at {}", args.config);
    }

    let has_env_config =
        std::env::vars().any(|(key, _)| key.starts_with("FRKB_") && key != "FRKB_CONFIG");

    if !has_config_file && !has_env_config {
        anyhow::bail!(
            "No configuration provided.\n\n\
             Provide configuration via one of:\n  \
             1. Config file: frkbd --config /path/to/config.toml\n  \
             2. Environment variables: FRKB_SERVER__BIND=0.0.0.0:8320 \
             FRKB_METADATA__TYPE=sqlite FRKB_METADATA__PATH=./data/frkb.db \
             FRKB_ADMIN__TOKEN_HASH=YOUR_TOKEN_HASH frkbd\n\n\
             Set FRKB_CONFIG to change the default config file path."
        );
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("FRKB_").split("__"))
        .extract()
        .context("failed to load configuration")?;

    frkb_server::metrics::register_metrics();
    tracing::info!("Prometheus metrics registered");

    let store = frkb_metadata::from_config(&config.metadata)
        .await
        .context("failed to initialize metadata store")?;

    // Catch connectivity and schema problems before accepting requests.
    store
        .health_check()
        .await
        .context("metadata store health check failed")?;
    tracing::info!("Metadata store initialized");

    let state = AppState::new(config.clone(), store);

    let maintenance = frkb_engine::spawn_maintenance(
        state.engine.clone(),
        frkb_engine::DEFAULT_MAINTENANCE_INTERVAL,
    );
    tracing::info!(
        interval_secs = frkb_engine::DEFAULT_MAINTENANCE_INTERVAL.as_secs(),
        "Maintenance task spawned"
    );

    let app = create_router(state);

    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await?;

    maintenance.shutdown().await;
    Ok(())
}
