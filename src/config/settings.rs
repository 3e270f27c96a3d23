//! Resolved per-session server settings

use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{ConfigError, DevConfig, AUTO_FRAMEWORK};
use crate::cli::DevFlags;
use crate::error::DevError;

pub const DEFAULT_PORT: u16 = 8888;
pub const DEFAULT_STATIC_SERVER_PORT: u16 = 3999;
pub const DEFAULT_FUNCTIONS_PORT: u16 = 34567;

/// Framework value that forces the embedded static server
pub const STATIC_FRAMEWORK: &str = "#static";

/// Ports, paths and command for one session. Read-only once resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// Display name of the framework, `None` for a custom command
    pub framework: Option<String>,
    pub command: String,
    pub args: Vec<String>,
    pub no_cmd: bool,
    /// Main proxy port
    pub port: u16,
    pub framework_port: u16,
    pub functions_port: u16,
    pub dist: PathBuf,
    pub functions: Option<PathBuf>,
    pub project_root: PathBuf,
    pub config_path: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
}

impl ServerSettings {
    /// Check the invariants every consumer relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.no_cmd && !self.command.is_empty() {
            return Err(ConfigError::Invalid(
                "a static server session cannot also run a command".to_string(),
            ));
        }
        if !self.no_cmd && self.command.is_empty() {
            return Err(ConfigError::Invalid("no command to run".to_string()));
        }

        let ports = [
            ("port", self.port),
            ("framework port", self.framework_port),
            ("functions port", self.functions_port),
        ];
        let mut seen = HashSet::new();
        for (name, port) in ports {
            if port == 0 {
                return Err(ConfigError::Invalid(format!("{} must be a positive number", name)));
            }
            if !seen.insert(port) {
                return Err(ConfigError::Invalid(format!(
                    "{} {} is already used by another Netlify Dev server",
                    name, port
                )));
            }
        }
        Ok(())
    }

    /// The command line as shown to the user
    pub fn command_line(&self) -> String {
        shell_words::join(std::iter::once(&self.command).chain(&self.args))
    }
}

/// Turns the assembled dev config into concrete settings
#[async_trait]
pub trait SettingsResolver: Send + Sync {
    async fn resolve(
        &self,
        dev_config: &DevConfig,
        flags: &DevFlags,
        project_root: &Path,
    ) -> Result<ServerSettings, DevError>;
}

/// Settings straight from configuration, without framework detection
#[derive(Debug, Clone, Default)]
pub struct ConfigSettingsResolver {
    pub config_path: Option<PathBuf>,
}

impl ConfigSettingsResolver {
    pub fn new(config_path: Option<PathBuf>) -> Self {
        Self { config_path }
    }
}

#[async_trait]
impl SettingsResolver for ConfigSettingsResolver {
    async fn resolve(
        &self,
        dev_config: &DevConfig,
        _flags: &DevFlags,
        project_root: &Path,
    ) -> Result<ServerSettings, DevError> {
        let raw_command = dev_config.command.as_deref().unwrap_or_default();
        let mut words = shell_words::split(raw_command)
            .map_err(|e| ConfigError::Invalid(format!("cannot parse command '{}': {}", raw_command, e)))?
            .into_iter();
        let command = words.next();
        let args: Vec<String> = words.collect();

        let forced_static = dev_config.framework == STATIC_FRAMEWORK;
        let no_cmd = forced_static || command.is_none();

        let (command, args, framework_port) = if no_cmd {
            let port = dev_config
                .static_server_port
                .unwrap_or(DEFAULT_STATIC_SERVER_PORT);
            (String::new(), Vec::new(), port)
        } else {
            let port = dev_config.target_port.ok_or_else(|| {
                ConfigError::Invalid(
                    "targetPort is required when a custom command is configured".to_string(),
                )
            })?;
            (command.unwrap_or_default(), args, port)
        };

        let framework = match dev_config.framework.as_str() {
            AUTO_FRAMEWORK | STATIC_FRAMEWORK => None,
            name => Some(name.to_string()),
        };

        let dist = dev_config
            .publish
            .as_deref()
            .map(|p| project_root.join(p))
            .unwrap_or_else(|| project_root.to_path_buf());
        let functions = dev_config.functions.as_deref().map(|p| project_root.join(p));

        let settings = ServerSettings {
            framework,
            command,
            args,
            no_cmd,
            port: dev_config.port.unwrap_or(DEFAULT_PORT),
            framework_port,
            functions_port: dev_config.functions_port.unwrap_or(DEFAULT_FUNCTIONS_PORT),
            dist,
            functions,
            project_root: project_root.to_path_buf(),
            config_path: self.config_path.clone(),
            env: dev_config.environment.clone(),
        };
        settings.validate()?;

        debug!(?settings, "Resolved server settings");
        Ok(settings)
    }
}
