//! Default command: load the config and serve every enabled forward

use anyhow::{Context, Result};
use clap::Args;
use sshmux::common::DEFAULT_CONFIG_PATH;
use sshmux::{Config, Forwarder};
use sshmux_observability::{init_tracing, TracingConfig};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path of the JSON config file, relative to the executable's directory
    #[arg(long, default_value = DEFAULT_CONFIG_PATH, env = "SSHMUX_CONFIG")]
    pub config: PathBuf,

    /// Log connection open/close and session lifecycle
    #[arg(long, env = "SSHMUX_DEBUG")]
    pub debug: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "SSHMUX_LOG_JSON")]
    pub log_json: bool,

    /// Keep the current working directory instead of moving next to the executable
    #[arg(long)]
    pub no_chdir: bool,
}

pub async fn run(args: RunArgs) -> Result<()> {
    init_tracing(TracingConfig {
        verbose: args.debug,
        json: args.log_json,
    })?;

    if !args.no_chdir {
        enter_executable_dir()?;
    }

    info!("Starting sshmux v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load(&args.config)
        .with_context(|| format!("failed to load config from {}", args.config.display()))?;
    debug!(config = ?config, "config loaded");

    let mut forwarder =
        Forwarder::from_config(&config).context("failed to set up the SSH connector")?;

    if forwarder.rules().iter().all(|rule| !rule.enabled) {
        warn!("no forward is enabled, nothing to do until Ctrl-C");
    }

    forwarder.start()?;

    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res.context("failed to listen for Ctrl-C")?;
            info!("Ctrl-C received, shutting down");
        }
        res = forwarder.wait() => {
            res.context("forward listener stopped")?;
            tokio::signal::ctrl_c().await.context("failed to listen for Ctrl-C")?;
        }
    }

    forwarder.shutdown();
    Ok(())
}

/// Relative config and key paths resolve next to the binary.
fn enter_executable_dir() -> Result<()> {
    let exe = std::env::current_exe().context("failed to locate the executable")?;
    let dir = exe.parent().unwrap_or_else(|| Path::new("."));

    std::env::set_current_dir(dir)
        .with_context(|| format!("failed to change directory to {}", dir.display()))?;
    debug!(dir = %dir.display(), "working directory set");
    Ok(())
}
