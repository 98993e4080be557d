use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub display: DisplayConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    // Executions older than this are pruned when a task is saved; 0 keeps everything
    pub max_retention_days: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct DisplayConfig {
    pub max_history_shown: usize,
    pub color: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            max_retention_days: 365, // Default 1 year
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            max_history_shown: 10,
            color: true,
        }
    }
}

impl Config {
    /// Load `config.toml` from the data directory, writing defaults on first use.
    pub fn new() -> Result<Self> {
        Self::load_or_init(&Self::data_dir().join("config.toml"))
    }

    pub fn load_or_init(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("failed to parse config {}", path.display()))?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save(path)?;
            Ok(config)
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(config_dir) = path.parent() {
            fs::create_dir_all(config_dir)
                .with_context(|| format!("failed to create {}", config_dir.display()))?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)
            .with_context(|| format!("failed to write config {}", path.display()))?;
        Ok(())
    }

    /// `$TG_HOME` if set, otherwise `~/.taskgate`.
    pub fn data_dir() -> PathBuf {
        match std::env::var_os("TG_HOME") {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".taskgate"),
        }
    }
}
