use std::path::{Path, PathBuf};

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use crate::config::PlaybackConfig;
use crate::error::ConfigError;

/// Supplies the list of playback scenarios the user can pick from
pub trait ConfigLoader: Send + Sync {
    /// Load all configurations. Failures are logged and yield an empty list.
    fn load_configs(&self) -> Vec<PlaybackConfig>;
}

/// On-disk document: a top-level `configs` list
#[derive(Debug, Default, Serialize, Deserialize)]
struct ConfigDocument {
    #[serde(default)]
    configs: Vec<PlaybackConfig>,
}

/// Loads configurations from the first candidate file that yields any
pub struct FileConfigLoader {
    candidates: Vec<PathBuf>,
}

impl FileConfigLoader {
    /// Search an explicit path first (if any), then the user config directory
    pub fn new(explicit: Option<PathBuf>) -> Self {
        let mut candidates = Vec::new();
        if let Some(path) = explicit {
            candidates.push(path);
        }
        if let Some(path) = Self::default_path() {
            candidates.push(path);
        }
        Self { candidates }
    }

    pub fn with_candidates(candidates: Vec<PathBuf>) -> Self {
        Self { candidates }
    }

    pub fn candidates(&self) -> &[PathBuf] {
        &self.candidates
    }

    /// `~/.config/wavplay/configs.toml` (platform config dir)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("wavplay").join("configs.toml"))
    }

    /// Parse one configuration file, format chosen by extension
    pub fn load_from(path: &Path) -> Result<Vec<PlaybackConfig>, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase())
            .unwrap_or_default();

        let document: ConfigDocument = match extension.as_str() {
            "toml" => toml::from_str(&content)?,
            "json" => serde_json::from_str(&content)?,
            _ => return Err(ConfigError::UnsupportedFormat { extension }),
        };

        let mut configs = Vec::with_capacity(document.configs.len());
        for config in document.configs {
            match config.validate() {
                Ok(()) => configs.push(config),
                Err(e) => warn!("Skipping configuration: {}", e),
            }
        }

        info!("Successfully parsed {} configurations from {}", configs.len(), path.display());
        Ok(configs)
    }

    /// Write configurations as TOML, creating parent directories as needed
    pub fn save_configs(path: &Path, configs: &[PlaybackConfig]) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let document = ConfigDocument {
            configs: configs.to_vec(),
        };
        let content = toml::to_string_pretty(&document)?;
        std::fs::write(path, content)?;

        Ok(())
    }
}

impl ConfigLoader for FileConfigLoader {
    fn load_configs(&self) -> Vec<PlaybackConfig> {
        for path in &self.candidates {
            if !path.exists() {
                debug!("Configuration file not found: {}", path.display());
                continue;
            }

            match Self::load_from(path) {
                Ok(configs) if !configs.is_empty() => {
                    info!("Loaded {} configurations from {}", configs.len(), path.display());
                    return configs;
                }
                Ok(_) => warn!("Configuration file {} contains no configurations", path.display()),
                Err(e) => error!("Failed to load configurations from {}: {}", path.display(), e),
            }
        }

        info!("No configuration file found, using empty configuration list");
        Vec::new()
    }
}

/// Fixed in-memory list, for embedding or tests
#[derive(Debug, Clone, Default)]
pub struct StaticConfigLoader {
    configs: Vec<PlaybackConfig>,
}

impl StaticConfigLoader {
    pub fn new(configs: Vec<PlaybackConfig>) -> Self {
        Self { configs }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load_configs(&self) -> Vec<PlaybackConfig> {
        self.configs.clone()
    }
}
