//! Session-wide error taxonomy
//!
//! Every stage of the dev session reports failures through `DevError`. None of
//! them are retried: the binary prints the message behind a severity marker and
//! terminates through the shutdown routine with `exit_code()`.

use std::time::Duration;
use thiserror::Error;

use crate::config::ConfigError;

#[derive(Error, Debug)]
pub enum DevError {
    /// Settings resolution or project configuration failed
    #[error("{0}")]
    Configuration(String),

    #[error("\"{command}\" could not be found in your PATH. Please make sure that \"{command}\" is installed and available in your PATH")]
    BinaryNotFound { command: String },

    #[error("Netlify Dev could not connect to localhost:{port}. Please make sure your framework server is running on port {port}")]
    ReadinessTimeout { port: u16, waited: Duration },

    #[error("Unable to start {kind} on port '{port}'")]
    ProxyStartFailure { kind: &'static str, port: u16 },

    #[error("\"{command}\" exited with code {code}. Shutting down Netlify Dev server")]
    ChildProcessExit { command: String, code: i32 },

    #[error("Platform API error: {0}")]
    Api(String),

    #[error("Live tunnel error: {0}")]
    Tunnel(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DevError {
    /// Process exit code for this failure
    pub fn exit_code(&self) -> i32 {
        match self {
            DevError::ChildProcessExit { code, .. } => *code,
            _ => 1,
        }
    }
}

impl From<ConfigError> for DevError {
    fn from(e: ConfigError) -> Self {
        DevError::Configuration(e.to_string())
    }
}

impl From<reqwest::Error> for DevError {
    fn from(e: reqwest::Error) -> Self {
        DevError::Api(e.to_string())
    }
}

impl From<tokio::task::JoinError> for DevError {
    fn from(e: tokio::task::JoinError) -> Self {
        DevError::Io(std::io::Error::other(format!("Task failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_mirrors_child() {
        let err = DevError::ChildProcessExit {
            command: "npm start".to_string(),
            code: 3,
        };
        assert_eq!(err.exit_code(), 3);
        assert_eq!(
            DevError::BinaryNotFound { command: "hugo".to_string() }.exit_code(),
            1
        );
    }

    #[test]
    fn test_binary_not_found_names_command() {
        let err = DevError::BinaryNotFound { command: "yarn".to_string() };
        assert!(err.to_string().starts_with("\"yarn\" could not be found in your PATH"));
    }
}
