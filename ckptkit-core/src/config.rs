//! Configuration system for ckptkit.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! project config file -> environment. The project file is `ckptkit.toml` in
//! the project directory; the user file lives in the platform config dir.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::CoreResult;
use crate::logging::LogConfig;

/// Name of the project-level configuration file.
pub const PROJECT_CONFIG_FILE: &str = "ckptkit.toml";

/// Prefix of environment overrides, e.g. `CKPTKIT_CHECKPOINT__MAX_TO_KEEP=5`.
pub const ENV_PREFIX: &str = "CKPTKIT_";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CkptConfig {
    #[serde(default)]
    pub checkpoint: CheckpointSettings,
    #[serde(default)]
    pub log: LogConfig,
}

/// Settings of a checkpoint manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointSettings {
    /// Directory checkpoints are written to. Created if missing.
    #[serde(default = "default_checkpoint_dir")]
    pub checkpoint_dir: PathBuf,
    /// Prefix of default checkpoint file names.
    #[serde(default = "default_model_name")]
    pub model_name: String,
    /// Maximum number of checkpoints retained by one manager (>= 1).
    #[serde(default = "default_max_to_keep")]
    pub max_to_keep: usize,
    /// Extension of default checkpoint file names, without the dot.
    #[serde(default = "default_extension")]
    pub extension: String,
    /// Zero-padding width of the epoch number in default file names.
    #[serde(default = "default_epoch_width")]
    pub epoch_width: usize,
    /// JSON-lines metadata log inside `checkpoint_dir`.
    #[serde(default = "default_metadata_file")]
    pub metadata_file: String,
    /// Index of retained checkpoints inside `checkpoint_dir`.
    #[serde(default = "default_index_file")]
    pub index_file: String,
}

impl Default for CheckpointSettings {
    fn default() -> Self {
        Self {
            checkpoint_dir: default_checkpoint_dir(),
            model_name: default_model_name(),
            max_to_keep: default_max_to_keep(),
            extension: default_extension(),
            epoch_width: default_epoch_width(),
            metadata_file: default_metadata_file(),
            index_file: default_index_file(),
        }
    }
}

impl CheckpointSettings {
    /// Default settings rooted at `checkpoint_dir`.
    pub fn new(checkpoint_dir: impl Into<PathBuf>) -> Self {
        Self {
            checkpoint_dir: checkpoint_dir.into(),
            ..Self::default()
        }
    }

    pub fn model_name(mut self, name: impl Into<String>) -> Self {
        self.model_name = name.into();
        self
    }

    pub fn max_to_keep(mut self, n: usize) -> Self {
        self.max_to_keep = n;
        self
    }

    pub fn extension(mut self, ext: impl Into<String>) -> Self {
        self.extension = ext.into();
        self
    }

    pub fn epoch_width(mut self, width: usize) -> Self {
        self.epoch_width = width;
        self
    }
}

fn default_checkpoint_dir() -> PathBuf {
    PathBuf::from("checkpoints")
}

fn default_model_name() -> String {
    "model".to_string()
}

fn default_max_to_keep() -> usize {
    3
}

fn default_extension() -> String {
    "ckpt".to_string()
}

fn default_epoch_width() -> usize {
    6
}

fn default_metadata_file() -> String {
    "checkpoint_metadata.jsonl".to_string()
}

fn default_index_file() -> String {
    "checkpoints.json".to_string()
}

/// Path of the user-level config file, if the platform has a config dir.
pub fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "ckptkit", "ckptkit")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with `CKPTKIT_`, nested with `__`)
/// 2. Project config (`<project_dir>/ckptkit.toml`)
/// 3. User config (`~/.config/ckptkit/config.toml` or platform equivalent)
/// 4. Built-in defaults
pub fn load_config(project_dir: Option<&Path>) -> CoreResult<CkptConfig> {
    let mut figment = Figment::from(Serialized::defaults(CkptConfig::default()));

    if let Some(user_config) = user_config_path() {
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(dir) = project_dir {
        let project_config = dir.join(PROJECT_CONFIG_FILE);
        if project_config.exists() {
            figment = figment.merge(Toml::file(&project_config));
        }
    }

    figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

    let config: CkptConfig = figment.extract().map_err(Box::new)?;
    Ok(config)
}
