//! # huddle-agent
//!
//! Realtime server binary: loads settings, starts the SSE endpoint and
//! serves until ctrl-c.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use huddle_server::{AllowListValidator, HuddleServer, ServerConfig};
use huddle_settings::HuddleSettings;

/// Time allowed for open streams to drain on shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// huddle realtime server.
#[derive(Parser, Debug)]
#[command(name = "huddle-agent", about = "huddle realtime event server")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (default `~/.huddle/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Log level (overrides settings; `RUST_LOG` wins over both).
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    /// Fold CLI overrides into loaded settings.
    fn apply(&self, settings: &mut HuddleSettings) {
        if let Some(ref host) = self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(ref level) = self.log_level {
            settings.logging.level.clone_from(level);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let settings_path = args
        .settings
        .clone()
        .unwrap_or_else(huddle_settings::settings_path);
    let mut settings = huddle_settings::load_settings_from_path(&settings_path)
        .with_context(|| format!("failed to load settings from {}", settings_path.display()))?;
    args.apply(&mut settings);

    huddle_core::logging::init_subscriber(&settings.logging.level);
    tracing::info!(path = %settings_path.display(), "settings loaded");

    if settings.auth.tokens.is_empty() {
        tracing::warn!("no auth tokens configured; every realtime connection will be rejected");
    }
    let validator = Arc::new(AllowListValidator::new(settings.auth.tokens.iter().cloned()));

    let metrics_handle = huddle_server::metrics::install_recorder();
    let config = ServerConfig::from_settings(&settings);
    let server = HuddleServer::new(config, validator).with_metrics(metrics_handle);

    let (addr, handle) = server.listen().await.context("failed to start server")?;
    tracing::info!(
        %addr,
        heartbeat_ms = settings.server.heartbeat_interval_ms,
        max_connections = settings.server.max_connections,
        "huddle server ready"
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;

    tracing::info!("shutting down...");
    server
        .shutdown()
        .graceful_shutdown(handle, Some(SHUTDOWN_TIMEOUT))
        .await;

    tracing::info!("shutdown complete");
    Ok(())
}
