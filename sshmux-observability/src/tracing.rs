use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

/// Crates whose logs the verbose toggle raises to `debug`.
const VERBOSE_TARGETS: &[&str] = &["sshmux", "sshmux_core", "sshmux_common", "sshmux_cli"];

/// Initialization options for logging
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingConfig {
    /// Log connection open/close and session lifecycle at debug
    pub verbose: bool,
    /// Emit JSON lines instead of human-readable text
    pub json: bool,
}

/// Filter used when `RUST_LOG` is not set.
pub fn default_filter(verbose: bool) -> EnvFilter {
    if verbose {
        let directives = VERBOSE_TARGETS
            .iter()
            .map(|target| format!("{target}=debug"))
            .collect::<Vec<_>>()
            .join(",");
        EnvFilter::new(format!("info,{directives}"))
    } else {
        EnvFilter::new("info")
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the verbose toggle.
pub fn init_tracing(config: TracingConfig) -> Result<(), anyhow::Error> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(config.verbose));

    if config.json {
        Registry::default()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init()?;
    } else {
        Registry::default()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_thread_ids(config.verbose)
                    .with_target(config.verbose),
            )
            .try_init()?;
    }

    tracing::debug!(verbose = config.verbose, "logging initialized");
    Ok(())
}
