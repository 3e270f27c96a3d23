//! Project configuration parsing (netlify.toml) and dev settings assembly

pub mod settings;
pub mod site;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::cli::DevFlags;

pub use settings::{ConfigSettingsResolver, ServerSettings, SettingsResolver};
pub use site::Site;

/// Project config file name
pub const CONFIG_FILE_NAME: &str = "netlify.toml";

/// Framework sentinel meaning "detect from the project"
pub const AUTO_FRAMEWORK: &str = "#auto";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),
    #[error("Failed to read config: {0}")]
    ReadError(String),
    #[error("Failed to parse config: {0}")]
    ParseError(String),
    #[error("Invalid settings: {0}")]
    Invalid(String),
}

/// Project configuration from netlify.toml
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProjectConfig {
    #[serde(default)]
    pub build: BuildSection,
    #[serde(default)]
    pub dev: DevSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BuildSection {
    pub command: Option<String>,
    pub publish: Option<PathBuf>,
    pub functions: Option<PathBuf>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DevSection {
    pub framework: Option<String>,
    pub command: Option<String>,
    pub port: Option<u16>,
    pub target_port: Option<u16>,
    pub static_server_port: Option<u16>,
    pub functions_port: Option<u16>,
    pub publish: Option<PathBuf>,
    pub functions: Option<PathBuf>,
    pub auto_launch: Option<bool>,
}

impl ProjectConfig {
    /// Load config from a config file path; a missing file yields the default config
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(config_path) = config_path else {
            return Ok(Self::default());
        };
        if !config_path.exists() {
            return Err(ConfigError::NotFound(config_path.display().to_string()));
        }

        let content =
            fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

/// Effective dev settings consumed by the session.
///
/// Each key is taken from the first source that sets it:
/// command-line flag, then `[dev]`, then (for `functions` and `publish` only)
/// `[build]`. `framework` falls back to [`AUTO_FRAMEWORK`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevConfig {
    pub framework: String,
    pub command: Option<String>,
    pub port: Option<u16>,
    pub target_port: Option<u16>,
    pub static_server_port: Option<u16>,
    pub functions_port: Option<u16>,
    pub publish: Option<PathBuf>,
    pub functions: Option<PathBuf>,
    pub auto_launch: Option<bool>,
    pub environment: BTreeMap<String, String>,
}

impl DevConfig {
    pub fn assemble(flags: &DevFlags, project: &ProjectConfig) -> Self {
        let dev = &project.dev;
        let build = &project.build;

        Self {
            framework: dev
                .framework
                .clone()
                .unwrap_or_else(|| AUTO_FRAMEWORK.to_string()),
            command: flags.command.clone().or_else(|| dev.command.clone()),
            port: flags.port.or(dev.port),
            target_port: flags.target_port.or(dev.target_port),
            static_server_port: flags.static_server_port.or(dev.static_server_port),
            functions_port: dev.functions_port,
            publish: flags
                .dir
                .clone()
                .or_else(|| dev.publish.clone())
                .or_else(|| build.publish.clone()),
            functions: flags
                .functions
                .clone()
                .or_else(|| dev.functions.clone())
                .or_else(|| build.functions.clone()),
            auto_launch: dev.auto_launch,
            environment: build.environment.clone(),
        }
    }

    /// Whether the browser should be opened once the session is up
    pub fn should_launch_browser(&self) -> bool {
        self.auto_launch != Some(false)
    }
}
