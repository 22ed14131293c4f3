//! Configuration file support for fsflash.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (FSFLASH_*)
//! 3. Local config file (./fsflash.toml)
//! 4. Global config file (~/.config/fsflash/config.toml)
//!
//! An explicit `--config PATH` replaces the file sources.

use {
    crate::CliError,
    directories::ProjectDirs,
    log::{debug, warn},
    serde::Deserialize,
    std::{
        fs,
        path::{Path, PathBuf},
        time::Duration,
    },
};

/// Name of the local config file.
const LOCAL_CONFIG_FILE: &str = "fsflash.toml";

/// Port configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PortConfig {
    /// Preferred serial port (e.g., "/dev/ttyUSB0" or "COM3").
    pub serial: Option<String>,
}

/// Flash configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FlashConfig {
    /// Retries per block before the upload is aborted.
    pub max_retries: Option<u32>,
    /// Per-read timeout in milliseconds.
    pub read_timeout_ms: Option<u64>,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Port configuration.
    #[serde(default)]
    pub port: PortConfig,
    /// Flash configuration.
    #[serde(default)]
    pub flash: FlashConfig,
}

impl Config {
    /// Load configuration from the global and local files.
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(global_path) = Self::global_config_path() {
            if let Some(global_config) = Self::load_from_file(&global_path) {
                debug!("Loaded global config from {}", global_path.display());
                config.merge(global_config);
            }
        }

        // Local config overrides global
        if let Some(local_config) = Self::load_from_file(Path::new(LOCAL_CONFIG_FILE)) {
            debug!("Loaded local config from {LOCAL_CONFIG_FILE}");
            config.merge(local_config);
        }

        config
    }

    /// Load configuration from a specific file path (--config flag).
    ///
    /// Unlike the implicit files, an explicit file must exist and parse.
    pub fn load_from_path(path: &Path) -> Result<Self, CliError> {
        let content = fs::read_to_string(path).map_err(|e| {
            CliError::Config(format!(
                "Failed to read config file {}: {e}",
                path.display()
            ))
        })?;
        let config = Self::parse(&content).map_err(|e| {
            CliError::Config(format!(
                "Invalid TOML in config file {}: {e}",
                path.display()
            ))
        })?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load configuration from an implicit file, warning about bad content.
    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => match Self::parse(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!(
                        "Ignoring config file {}: invalid TOML: {e}",
                        path.display()
                    );
                    None
                },
            },
            Err(e) => {
                warn!("Failed to read config file {}: {e}", path.display());
                None
            },
        }
    }

    fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "fsflash").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Configured read timeout, if any.
    pub fn read_timeout(&self) -> Option<Duration> {
        self.flash
            .read_timeout_ms
            .map(Duration::from_millis)
    }

    /// Merge another config into this one.
    fn merge(&mut self, other: Self) {
        if other.port.serial.is_some() {
            self.port.serial = other.port.serial;
        }
        if other.flash.max_retries.is_some() {
            self.flash.max_retries = other.flash.max_retries;
        }
        if other.flash.read_timeout_ms.is_some() {
            self.flash.read_timeout_ms = other.flash.read_timeout_ms;
        }
    }
}
