//! Box Relay Server
//!
//! Run with: cargo run --bin box-relay -- --config config.toml
//!
//! Without `--config` the default locations are searched
//! (`~/.config/box-relay/config.toml`, `/etc/box-relay/config.toml`,
//! `./config.toml`). `BOX_RELAY_*` environment variables override file
//! settings and `RUST_LOG` overrides the configured log level.

use anyhow::Context;
use box_relay::{serve, AppState, Config, LoggingConfig};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "box-relay")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "WebSocket broadcast relay for embedded control boxes")]
struct Args {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_with_env(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::load_default(),
    };

    init_logging(&config.logging);

    tracing::info!("Starting Box Relay v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        write_timeout_ms = config.relay.write_timeout_ms,
        default_box_id = %config.relay.default_box_id,
        filter_by_target = config.relay.filter_by_target,
        "Relay settings"
    );

    let state = AppState::new(config.api_config(), config.registry_config());
    serve(state).await.context("relay server failed")?;

    tracing::info!("Box Relay stopped");
    Ok(())
}

/// Initialize tracing from the logging config
fn init_logging(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("box_relay={},tower_http=info", logging.level).into()
    });

    let registry = tracing_subscriber::registry().with(filter);

    if logging.is_json() {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
