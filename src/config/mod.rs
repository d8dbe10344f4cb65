//! Configuration management for zentao-cli.
//!
//! This module handles loading, saving, and validating the user
//! configuration: the active profile and application settings. Secrets are
//! never written here; they live in the credential store.

mod settings;

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub use settings::Settings;

/// Application name used for the config directory.
const APP_NAME: &str = "zentao-cli";

/// Config file name.
const CONFIG_FILE: &str = "config.toml";

/// Environment variable overriding the config directory.
pub const CONFIG_DIR_ENV: &str = "ZENTAO_CLI_CONFIG_DIR";

/// Name of the profile used when none is configured.
pub const DEFAULT_PROFILE: &str = "default";

/// Errors that can occur while loading or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("Could not determine configuration directory")]
    NoConfigDir,

    /// The config directory could not be created.
    #[error("Failed to create configuration directory: {0}")]
    CreateDirError(#[source] std::io::Error),

    /// The config file could not be read.
    #[error("Failed to read configuration file: {0}")]
    ReadError(#[source] std::io::Error),

    /// The config file could not be written.
    #[error("Failed to write configuration file: {0}")]
    WriteError(#[source] std::io::Error),

    /// The config file is not valid TOML.
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] toml::de::Error),

    /// The config could not be serialized.
    #[error("Failed to serialize configuration: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// A value failed validation.
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// The persisted configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// The profile whose credentials are used.
    #[serde(default = "default_profile")]
    pub profile: String,
    /// Application settings.
    #[serde(default)]
    pub settings: Settings,
}

fn default_profile() -> String {
    DEFAULT_PROFILE.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            settings: Settings::default(),
        }
    }
}

impl Config {
    /// Load the configuration from the default location.
    ///
    /// A missing file yields the default configuration.
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path()?)
    }

    /// Load the configuration from `path`.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save the configuration to the default location.
    pub fn save(&self) -> Result<()> {
        self.save_to(&config_path()?)
    }

    /// Save the configuration to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        self.validate()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(ConfigError::CreateDirError)?;
        }

        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents).map_err(ConfigError::WriteError)?;
        debug!(path = %path.display(), "Saved config");
        Ok(())
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if the profile name is empty or
    /// contains whitespace, or if the settings are invalid.
    pub fn validate(&self) -> Result<()> {
        validate_profile_name(&self.profile)?;
        self.settings.validate()
    }
}

/// Check that a profile name is usable as a keyring entry name.
pub fn validate_profile_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ConfigError::ValidationError(
            "profile name cannot be empty".to_string(),
        ));
    }

    if name.contains(char::is_whitespace) {
        return Err(ConfigError::ValidationError(format!(
            "profile name '{}' cannot contain whitespace",
            name
        )));
    }

    Ok(())
}

/// Path of the config file.
pub fn config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE))
}

fn config_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV) {
        return Ok(PathBuf::from(dir));
    }

    dirs::config_dir()
        .map(|dir| dir.join(APP_NAME))
        .ok_or(ConfigError::NoConfigDir)
}
