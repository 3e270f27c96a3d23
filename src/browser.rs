//! Opening the session URL in the user's browser

use async_trait::async_trait;
use std::process::Stdio;
use tracing::debug;

use crate::env::SessionEnvironment;
use crate::error::DevError;

pub const BROWSER_VAR: &str = "BROWSER";

#[async_trait]
pub trait BrowserOpener: Send + Sync {
    async fn open(&self, url: &str, env: &SessionEnvironment) -> Result<(), DevError>;
}

/// Opens URLs with `$BROWSER` or the platform's default opener
#[derive(Debug, Clone, Default)]
pub struct SystemBrowser;

/// Program and leading arguments used to open a URL, `None` when disabled
pub fn opener_command(env: &SessionEnvironment) -> Option<(String, Vec<String>)> {
    match env.get(BROWSER_VAR) {
        Some("none") => None,
        Some(browser) if !browser.is_empty() => Some((browser.to_string(), Vec::new())),
        _ => Some(platform_opener()),
    }
}

fn platform_opener() -> (String, Vec<String>) {
    if cfg!(target_os = "macos") {
        ("open".to_string(), Vec::new())
    } else if cfg!(windows) {
        (
            "cmd".to_string(),
            vec!["/C".to_string(), "start".to_string(), String::new()],
        )
    } else {
        ("xdg-open".to_string(), Vec::new())
    }
}

#[async_trait]
impl BrowserOpener for SystemBrowser {
    async fn open(&self, url: &str, env: &SessionEnvironment) -> Result<(), DevError> {
        let Some((program, args)) = opener_command(env) else {
            debug!("Browser disabled through BROWSER=none");
            return Ok(());
        };

        let status = env
            .command(&program)
            .args(&args)
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await?;
        if !status.success() {
            return Err(DevError::Io(std::io::Error::other(format!(
                "{} exited with {}",
                program, status
            ))));
        }
        Ok(())
    }
}
