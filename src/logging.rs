use anyhow::{anyhow, Result};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::AppConfig;

/// Initialize logging with debug flag
pub fn init_logging_with_debug(debug: bool) -> Result<()> {
    init_logging_with_options(None, debug)
}

/// Initialize logging. `RUST_LOG` wins over `log_level`, which wins over the debug flag.
pub fn init_logging_with_options(log_level: Option<&str>, debug: bool) -> Result<()> {
    let level = effective_level(log_level, debug);
    let filter = build_filter(level)?;

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| anyhow!("Failed to install log subscriber: {}", e))?;

    debug!("Logging initialized with level: {}", level);
    Ok(())
}

fn effective_level(log_level: Option<&str>, debug: bool) -> &str {
    log_level.unwrap_or(if debug { "debug" } else { "info" })
}

fn build_filter(level: &str) -> Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| anyhow!("Invalid log level '{}': {}", level, e))
}

/// Log where the configuration came from and the values that shape the loop
pub fn log_configuration_status(config_path: &Path, config: &AppConfig) {
    info!("=== Configuration Status ===");

    if config_path.exists() {
        info!("Configuration file: {}", config_path.display());
    } else {
        warn!(
            "Configuration file {} not found - using defaults",
            config_path.display()
        );
    }

    info!("Database: {}", config.get_database_path().display());
    info!(
        "Discovery: {} (browse timeout {:?})",
        config.discovery.service_type,
        config.discovery.browse_timeout()
    );
    info!(
        "Cycle every {:?}, reaping {:?} after spawning",
        config.supervisor.cycle_interval(),
        config.supervisor.settle_interval()
    );
    debug!(
        "Playback: {} progress attempts every {:?}, default display {:?}",
        config.playback.progress_attempts,
        config.playback.progress_retry(),
        config.playback.default_display()
    );
    debug!("Renderer command: {}", config.renderer.command);
}

/// Log shutdown information
pub fn log_shutdown_info(workers_terminated: usize, uptime: Duration) {
    info!("=== Slidecast Shutting Down ===");

    let uptime_seconds = uptime.as_secs();
    info!(
        "Total uptime: {}h {}m",
        uptime_seconds / 3600,
        (uptime_seconds % 3600) / 60
    );
    info!("Workers terminated: {}", workers_terminated);

    info!("=== Shutdown Complete ===");
}
