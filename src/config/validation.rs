use anyhow::{anyhow, Result};

use super::AppConfig;

/// Configuration validator for ensuring configuration integrity
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the entire application configuration
    pub fn validate(config: &AppConfig) -> Result<()> {
        Self::validate_supervisor_config(config)?;
        Self::validate_discovery_config(config)?;
        Self::validate_database_config(config)?;
        Self::validate_playback_config(config)?;
        Self::validate_renderer_config(config)?;
        Ok(())
    }

    fn validate_supervisor_config(config: &AppConfig) -> Result<()> {
        let supervisor = &config.supervisor;

        if supervisor.cycle_interval_secs == 0 {
            return Err(anyhow!("Cycle interval must be greater than 0 seconds"));
        }

        if supervisor.settle_interval_secs == 0 {
            return Err(anyhow!("Settle interval must be greater than 0 seconds"));
        }

        // The settle pause is carved out of the cycle
        if supervisor.settle_interval_secs >= supervisor.cycle_interval_secs {
            return Err(anyhow!(
                "Settle interval ({}s) must be shorter than the cycle interval ({}s)",
                supervisor.settle_interval_secs,
                supervisor.cycle_interval_secs
            ));
        }

        Ok(())
    }

    fn validate_discovery_config(config: &AppConfig) -> Result<()> {
        let service_type = config.discovery.service_type.trim();

        if service_type.is_empty() {
            return Err(anyhow!("Discovery service type cannot be empty"));
        }

        // mdns-sd requires the fully qualified form with the trailing dot
        if !service_type.ends_with(".local.") {
            return Err(anyhow!(
                "Discovery service type must end with '.local.': {}",
                service_type
            ));
        }

        if config.discovery.browse_timeout_ms == 0 {
            return Err(anyhow!("Browse timeout must be greater than 0 milliseconds"));
        }

        Ok(())
    }

    fn validate_database_config(config: &AppConfig) -> Result<()> {
        if let Some(path) = &config.database.path {
            if path.trim().is_empty() {
                return Err(anyhow!("Database path cannot be empty"));
            }
        }

        Ok(())
    }

    fn validate_playback_config(config: &AppConfig) -> Result<()> {
        let playback = &config.playback;

        if playback.progress_attempts == 0 {
            return Err(anyhow!("Progress attempts must be at least 1"));
        }

        if playback.unknown_duration_fallback_secs == 0 {
            return Err(anyhow!(
                "Unknown duration fallback must be greater than 0 seconds"
            ));
        }

        if playback.default_display_secs == 0 {
            return Err(anyhow!("Default display time must be greater than 0 seconds"));
        }

        Ok(())
    }

    fn validate_renderer_config(config: &AppConfig) -> Result<()> {
        let renderer = &config.renderer;

        if renderer.command.trim().is_empty() {
            return Err(anyhow!("Renderer command cannot be empty"));
        }

        if renderer.format.trim().is_empty() {
            return Err(anyhow!("Renderer output format cannot be empty"));
        }

        if renderer.width == 0 || renderer.height == 0 {
            return Err(anyhow!(
                "Renderer dimensions must be non-zero, got {}x{}",
                renderer.width,
                renderer.height
            ));
        }

        if renderer.quality > 100 {
            return Err(anyhow!(
                "Renderer quality must be between 0 and 100, got {}",
                renderer.quality
            ));
        }

        Ok(())
    }
}
