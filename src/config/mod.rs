use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

pub mod validation;

use validation::ConfigValidator;

const APP_DIR_NAME: &str = "slidecast";

/// Main application configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub supervisor: SupervisorConfig,
    pub discovery: DiscoveryConfig,
    pub database: DatabaseConfig,
    pub playback: PlaybackConfig,
    pub renderer: RendererConfig,
}

/// Discovery cycle timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Full discovery cycle length, also used as the back-off when nothing is found
    pub cycle_interval_secs: u64,
    /// Pause between spawning workers and reaping, so new workers can connect
    pub settle_interval_secs: u64,
}

/// Receiver discovery settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    pub service_type: String,
    pub browse_timeout_ms: u64,
}

/// Database configuration settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: Option<String>,
}

/// Per-slide timing used by device workers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// How many times the progress monitor asks a receiver for a duration
    pub progress_attempts: u32,
    pub progress_retry_secs: u64,
    /// Wait applied to video/audio slides whose duration never became known
    pub unknown_duration_fallback_secs: u64,
    /// Display time for slides that do not carry one
    pub default_display_secs: u64,
}

/// External rasterizer invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RendererConfig {
    pub command: String,
    pub format: String,
    pub width: u32,
    pub height: u32,
    pub quality: u8,
    pub javascript_delay_ms: u64,
}

impl AppConfig {
    /// Load configuration from file or create with defaults
    pub fn load_or_create<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let config_path = config_path.as_ref();

        if config_path.exists() {
            Self::load_from_file(config_path)
        } else {
            let default_config = Self::default();
            default_config.save_to_file(config_path).with_context(|| {
                format!(
                    "Failed to create default configuration file at: {}",
                    config_path.display()
                )
            })?;

            tracing::info!("Created default configuration file at: {}", config_path.display());
            Ok(default_config)
        }
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let content = std::fs::read_to_string(config_path.as_ref()).with_context(|| {
            format!("Failed to read config file: {}", config_path.as_ref().display())
        })?;

        let config: AppConfig = toml::from_str(&content).with_context(|| {
            format!("Failed to parse config file: {}", config_path.as_ref().display())
        })?;

        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, config_path: P) -> Result<()> {
        let config_path = config_path.as_ref();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = self.to_commented_toml()?;

        std::fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    fn to_commented_toml(&self) -> Result<String> {
        let base_toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        let mut content = String::from("# Slidecast configuration\n\n");

        for line in base_toml.lines() {
            if line.starts_with("[supervisor]") {
                content.push_str("# Discovery cycle timing, in seconds\n");
            } else if line.starts_with("[discovery]") {
                content.push_str("\n# DNS-SD service browsed for display receivers\n");
            } else if line.starts_with("[database]") {
                content.push_str("\n# Slideshow database (read-only from slidecast)\n");
            } else if line.starts_with("[playback]") {
                content.push_str("\n# Per-slide timing\n");
            } else if line.starts_with("[renderer]") {
                content.push_str("\n# HTML/URL rasterizer command\n");
            }

            content.push_str(line);
            content.push('\n');
        }

        Ok(content)
    }

    /// Default location of the configuration file
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR_NAME)
            .join("config.toml")
    }

    /// Get the database file path, using the platform data directory if not specified
    pub fn get_database_path(&self) -> PathBuf {
        match &self.database.path {
            Some(path) => PathBuf::from(path),
            None => Self::default_database_path(),
        }
    }

    fn default_database_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR_NAME)
            .join("slidecast.db")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supervisor: SupervisorConfig {
                cycle_interval_secs: 50,
                settle_interval_secs: 10,
            },
            discovery: DiscoveryConfig {
                service_type: "_airplay._tcp.local.".to_string(),
                browse_timeout_ms: 3000,
            },
            database: DatabaseConfig {
                path: Some(Self::default_database_path().to_string_lossy().to_string()),
            },
            playback: PlaybackConfig {
                progress_attempts: 5,
                progress_retry_secs: 1,
                unknown_duration_fallback_secs: 5,
                default_display_secs: 5,
            },
            renderer: RendererConfig {
                command: "wkhtmltoimage".to_string(),
                format: "png".to_string(),
                width: 1920,
                height: 1080,
                quality: 10,
                javascript_delay_ms: 5000,
            },
        }
    }
}

impl SupervisorConfig {
    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_secs)
    }

    pub fn settle_interval(&self) -> Duration {
        Duration::from_secs(self.settle_interval_secs)
    }
}

impl DiscoveryConfig {
    pub fn browse_timeout(&self) -> Duration {
        Duration::from_millis(self.browse_timeout_ms)
    }
}

impl PlaybackConfig {
    pub fn progress_retry(&self) -> Duration {
        Duration::from_secs(self.progress_retry_secs)
    }

    pub fn unknown_duration_fallback(&self) -> Duration {
        Duration::from_secs(self.unknown_duration_fallback_secs)
    }

    pub fn default_display(&self) -> Duration {
        Duration::from_secs(self.default_display_secs)
    }
}
