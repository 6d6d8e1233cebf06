//! Configuration management for layer-backup.
//!
//! Loads configuration from a TOML file with environment variable overrides.
//! Every section is optional; missing values fall back to the defaults below.

use crate::executor::CycleOptions;
use crate::host::WriteOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Prefix of the environment variables that override the file
pub const ENV_PREFIX: &str = "LAYER_BACKUP_";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub writer: WriterConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub settings: SettingsConfig,

    #[serde(default)]
    pub notify: NotifyConfig,

    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriterConfig {
    /// Output driver (only GPKG is supported)
    #[serde(default = "default_format")]
    pub format: String,

    /// Primary key column of every written table
    #[serde(default = "default_primary_key_field")]
    pub primary_key_field: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Session file listing the open layers
    #[serde(default)]
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsConfig {
    /// SQLite database holding the saved preferences
    #[serde(default = "default_settings_path")]
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default = "default_notify_title")]
    pub title: String,

    /// How long a notification stays visible
    #[serde(default = "default_notify_duration")]
    pub duration_secs: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values
fn default_format() -> String {
    "GPKG".to_string()
}

fn default_primary_key_field() -> String {
    "id".to_string()
}

fn default_settings_path() -> PathBuf {
    directories::ProjectDirs::from("", "", "layer-backup")
        .map(|dirs| dirs.config_dir().join("settings.db"))
        .unwrap_or_else(|| PathBuf::from("layer-backup-settings.db"))
}

fn default_notify_title() -> String {
    "Auto Backup".to_string()
}

fn default_notify_duration() -> u32 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
            primary_key_field: default_primary_key_field(),
        }
    }
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            path: default_settings_path(),
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            title: default_notify_title(),
            duration_secs: default_notify_duration(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load the file if given (defaults otherwise), then apply `.env` and
    /// `LAYER_BACKUP_*` overrides from the process environment.
    pub fn load(path: Option<&Path>) -> crate::Result<Self> {
        let _ = dotenvy::dotenv();

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Override values from `lookup`, which maps a variable name to its value.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        if let Some(v) = var("FORMAT") {
            self.writer.format = v;
        }
        if let Some(v) = var("PRIMARY_KEY") {
            self.writer.primary_key_field = v;
        }
        if let Some(v) = var("SESSION") {
            self.session.file = Some(PathBuf::from(v));
        }
        if let Some(v) = var("SETTINGS") {
            self.settings.path = PathBuf::from(v);
        }
        if let Some(v) = var("NOTIFY_TITLE") {
            self.notify.title = v;
        }
        if let Some(v) = var("NOTIFY_DURATION").and_then(|v| v.parse().ok()) {
            self.notify.duration_secs = v;
        }
        if let Some(v) = var("LOG_LEVEL") {
            self.log.level = v;
        }
    }

    pub fn write_options(&self) -> crate::Result<WriteOptions> {
        Ok(WriteOptions {
            format: self.writer.format.parse()?,
            primary_key_field: self.writer.primary_key_field.clone(),
        })
    }

    pub fn cycle_options(&self) -> crate::Result<CycleOptions> {
        Ok(CycleOptions {
            write: self.write_options()?,
            notify_title: self.notify.title.clone(),
            notify_duration_secs: self.notify.duration_secs,
        })
    }
}
