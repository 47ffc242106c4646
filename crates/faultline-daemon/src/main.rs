// SPDX-License-Identifier: MIT OR Apache-2.0
use anyhow::{Context, Result};
use clap::Parser;
use faultline_boundary::RateLimitGuard;
use faultline_config::{load_config, validate_config};
use faultline_daemon::{AppState, build_app};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "faultline-daemon",
    version,
    about = "Reference service answering through faultline boundaries"
)]
struct Args {
    /// Bind address.
    #[arg(long, default_value = "127.0.0.1:8089")]
    bind: String,

    /// Logging config file (TOML). Environment variables override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Load a demo account and profiles.
    #[arg(long)]
    seed: bool,

    /// Enable debug diagnostics from the substrate itself.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.debug {
        EnvFilter::new("faultline=debug,faultline_daemon=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("faultline=info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = load_config(args.config.as_deref()).context("load config")?;
    for warning in validate_config(&config).context("validate config")? {
        warn!(%warning, "config warning");
    }
    let logger = config.build_logger().context("build logger")?;

    let mut state = AppState::new(logger.clone())?;
    if let Some(limit) = &config.rate_limit {
        state = state.with_rate_limit(RateLimitGuard::new(
            limit.max_requests,
            Duration::from_secs(limit.window_secs),
        ));
    }
    if args.seed {
        state.seed_demo().await;
    }
    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(&args.bind)
        .await
        .with_context(|| format!("bind {}", args.bind))?;
    info!(bind = %args.bind, environment = %logger.environment(), "faultline-daemon listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serve")?;

    info!("shutting down");
    logger.close().await.context("close logger")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
    }
}
