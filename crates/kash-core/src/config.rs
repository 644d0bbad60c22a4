//! Configuration system for Kash
//!
//! Supports TOML configuration files with sensible defaults.
//! The CLI looks for its configuration file at:
//! - macOS: ~/Library/Application Support/kash/config.toml
//! - Linux: ~/.config/kash/config.toml
//! - Windows: %APPDATA%/kash/config.toml

use std::path::{Component, Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{KashError, Result};
use crate::{DEFAULT_CACHE_NAME, DEFAULT_MEMORY_ENTRIES, DEFAULT_MEMORY_ENTRY_BYTES};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Cache store settings
    pub cache: CacheConfig,
    /// Logging settings
    pub log: LogConfig,
}

/// Disk store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Parent directory of the cache (uses `$HOME/.cache` or `.` if None)
    pub root: Option<PathBuf>,
    /// Cache name, also the name of the cache directory under `root`
    pub name: String,
    /// In-memory tier settings
    pub memory: MemoryConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: None,
            name: DEFAULT_CACHE_NAME.to_string(),
            memory: MemoryConfig::default(),
        }
    }
}

/// Memory tier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Keep recently read values in memory
    pub enabled: bool,
    /// Maximum number of values held in memory
    pub max_entries: usize,
    /// Values larger than this are never held in memory
    pub max_entry_bytes: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_entries: DEFAULT_MEMORY_ENTRIES,
            max_entry_bytes: DEFAULT_MEMORY_ENTRY_BYTES,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

impl CacheConfig {
    /// Config rooted at a specific directory
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Enable the memory tier with the given entry count and size ceiling
    pub fn with_memory(mut self, max_entries: usize, max_entry_bytes: usize) -> Self {
        self.memory = MemoryConfig {
            enabled: true,
            max_entries,
            max_entry_bytes,
        };
        self
    }

    /// `$HOME/.cache` if HOME is set and non-empty, else the working directory
    pub fn default_root() -> PathBuf {
        match std::env::var_os("HOME") {
            Some(home) if !home.is_empty() => PathBuf::from(home).join(".cache"),
            _ => PathBuf::from("."),
        }
    }

    /// Effective root directory (config override or default)
    pub fn root_dir(&self) -> PathBuf {
        self.root.clone().unwrap_or_else(Self::default_root)
    }

    /// Directory holding the metadata document and payload files
    pub fn cache_dir(&self) -> PathBuf {
        self.root_dir().join(&self.name)
    }

    /// Check the settings once, before a store is built from them
    pub fn validate(&self) -> Result<()> {
        let mut components = Path::new(&self.name).components();
        let single_normal = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        );
        if self.name.is_empty() || !single_normal {
            return Err(KashError::Configuration(format!(
                "cache name {:?} must be a single directory name",
                self.name
            )));
        }

        if self.memory.enabled && self.memory.max_entries == 0 {
            return Err(KashError::Configuration(
                "memory tier max_entries must be positive".into(),
            ));
        }

        Ok(())
    }
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Self {
        match Self::default_path() {
            Some(path) => Self::load_from(&path).unwrap_or_else(|e| {
                warn!("Failed to load config from {:?}: {}, using defaults", path, e);
                Self::default()
            }),
            None => {
                debug!("No config directory found, using defaults");
                Self::default()
            }
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("Config file {:?} not found, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| KashError::io(path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| KashError::Configuration(format!("{:?}: {}", path, e)))?;

        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| KashError::io(parent, e))?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| KashError::Serialization(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| KashError::io(path, e))?;

        info!("Saved config to {:?}", path);
        Ok(())
    }

    /// Get the default config file path
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "kash").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Generate a sample configuration file content
    pub fn sample() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
