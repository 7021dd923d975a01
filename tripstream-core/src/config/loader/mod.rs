use crate::client::ClientConfig;
use crate::config::constants::config_files;
use crate::config::core::{RetrySettings, StorageConfig, StreamConfig};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure for tripstream
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TripstreamConfig {
    /// Endpoint and stream timeouts
    #[serde(default)]
    pub stream: StreamConfig,

    /// Retry policy for opening streams
    #[serde(default)]
    pub retry: RetrySettings,

    /// Durable session storage
    #[serde(default)]
    pub storage: StorageConfig,

    /// HTTP client tuning
    #[serde(default)]
    pub client: ClientConfig,
}

impl TripstreamConfig {
    /// Write `tripstream.toml` with default values into `workspace`.
    ///
    /// Returns the path written, or `None` when a config already exists and
    /// `force` is false.
    pub fn bootstrap_project<P: AsRef<Path>>(workspace: P, force: bool) -> Result<Option<PathBuf>> {
        let config_path = workspace.as_ref().join(config_files::CONFIG_FILE_NAME);
        if config_path.exists() && !force {
            return Ok(None);
        }

        Self::create_sample_config(&config_path)?;
        Ok(Some(config_path))
    }

    /// Create sample configuration file
    pub fn create_sample_config<P: AsRef<Path>>(output: P) -> Result<()> {
        let output = output.as_ref();
        let content = toml::to_string_pretty(&TripstreamConfig::default())
            .context("Failed to serialize default configuration")?;

        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create config directory: {}", parent.display())
                })?;
            }
        }

        fs::write(output, content)
            .with_context(|| format!("Failed to write config file: {}", output.display()))?;

        Ok(())
    }
}

/// Configuration manager for locating and loading `tripstream.toml`
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: TripstreamConfig,
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration starting from the current directory
    pub fn load() -> Result<Self> {
        Self::load_from_workspace(std::env::current_dir()?)
    }

    fn get_home_dir() -> Option<PathBuf> {
        if let Ok(home) = std::env::var("HOME") {
            return Some(PathBuf::from(home));
        }

        if let Ok(userprofile) = std::env::var("USERPROFILE") {
            return Some(PathBuf::from(userprofile));
        }

        dirs::home_dir()
    }

    /// Load configuration from a specific workspace.
    ///
    /// Search order: `<workspace>/tripstream.toml`,
    /// `<workspace>/.tripstream/tripstream.toml`, `~/.tripstream/tripstream.toml`.
    /// Defaults are used when none exists.
    pub fn load_from_workspace(workspace: impl AsRef<Path>) -> Result<Self> {
        let workspace = workspace.as_ref();

        let mut candidates = vec![
            workspace.join(config_files::CONFIG_FILE_NAME),
            workspace
                .join(config_files::CONFIG_DIR_NAME)
                .join(config_files::CONFIG_FILE_NAME),
        ];
        if let Some(home_dir) = Self::get_home_dir() {
            candidates.push(
                home_dir
                    .join(config_files::CONFIG_DIR_NAME)
                    .join(config_files::CONFIG_FILE_NAME),
            );
        }

        for candidate in candidates {
            if candidate.exists() {
                return Self::load_from_file(&candidate);
            }
        }

        Ok(Self {
            config: TripstreamConfig::default(),
            config_path: None,
        })
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: TripstreamConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(Self {
            config,
            config_path: Some(path.to_path_buf()),
        })
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &TripstreamConfig {
        &self.config
    }

    /// Mutable access for command-line overrides
    pub fn config_mut(&mut self) -> &mut TripstreamConfig {
        &mut self.config
    }

    /// Get the configuration file path (if loaded from file)
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    pub fn into_config(self) -> TripstreamConfig {
        self.config
    }
}
