// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Wandelwerk: upload-convert-download service.
//
// Entry point. Initialises logging and configuration, clears workspaces left
// behind by a previous run, and serves the HTTP API until Ctrl-C.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};
use wandelwerk_core::config::AppConfig;
use wandelwerk_core::error::Result;
use wandelwerk_engine::ConversionService;

/// Workspaces older than this at startup belong to a dead process.
const ORPHAN_MAX_AGE: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Parser)]
#[command(name = "wandelwerk", version, about = "Upload-convert-download file conversion service")]
struct Cli {
    /// JSON configuration file.
    #[arg(long, env = "WANDELWERK_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on, overriding the configuration.
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(bind) = cli.bind {
        config.bind_address = bind;
    }

    info!(
        max_file_size_bytes = config.max_file_size_bytes,
        max_pdf_pages = config.max_pdf_pages,
        max_image_batch_pages = config.max_image_batch_pages,
        timeout_s = config.external_tool_timeout_seconds,
        workspace_root = %config.workspace_root.display(),
        "Wandelwerk starting"
    );

    let service = ConversionService::from_config(&config)?;
    if let Err(err) = service.workspaces().sweep_orphans(ORPHAN_MAX_AGE) {
        warn!(%err, "Workspace sweep failed");
    }

    let listener = tokio::net::TcpListener::bind(config.bind_address.as_str()).await?;
    info!(address = %config.bind_address, "Server listening");

    axum::serve(listener, wandelwerk_server::app(service))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Wandelwerk stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(%err, "Cannot listen for Ctrl-C; stopping now");
    }
}
