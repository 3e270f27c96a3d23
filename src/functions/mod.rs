//! Serverless function discovery and the functions-runtime launcher seam

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::{ServerSettings, Site};
use crate::error::DevError;
use crate::platform::SiteDetails;
use crate::util::{emit, Severity};

pub const FUNCTIONS_ROUTE_PREFIX: &str = "/.netlify/functions";
const BACKGROUND_SUFFIX: &str = "-background";
const SOURCE_EXTENSIONS: &[&str] = &["js", "mjs", "cjs", "ts", "zip"];
const DIRECTORY_ENTRY_EXTENSIONS: &[&str] = &["js", "ts"];

/// One deployable function found in the functions directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionInfo {
    pub name: String,
    /// File or directory the function is built from
    pub local_path: PathBuf,
    pub is_background: bool,
}

impl FunctionInfo {
    /// Path the function answers on behind the proxy
    pub fn route(&self) -> String {
        format!("{}/{}", FUNCTIONS_ROUTE_PREFIX, self.name)
    }
}

/// List the functions directly inside `dir`, sorted by name.
///
/// A missing directory yields an empty list.
pub fn get_functions(dir: &Path) -> Vec<FunctionInfo> {
    if !dir.is_dir() {
        return Vec::new();
    }

    let mut functions: Vec<FunctionInfo> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, "Skipping unreadable functions entry");
                None
            }
        })
        .filter_map(|entry| function_from_entry(entry.path(), entry.file_type().is_dir()))
        .collect();
    functions.sort_by(|a, b| a.name.cmp(&b.name));
    functions
}

fn function_from_entry(path: &Path, is_dir: bool) -> Option<FunctionInfo> {
    let name = if is_dir {
        let dir_name = path.file_name()?.to_str()?;
        let has_entry = DIRECTORY_ENTRY_EXTENSIONS.iter().any(|ext| {
            path.join(format!("{}.{}", dir_name, ext)).is_file()
                || path.join(format!("index.{}", ext)).is_file()
        });
        if !has_entry {
            return None;
        }
        dir_name.to_string()
    } else {
        let ext = path.extension()?.to_str()?;
        if !SOURCE_EXTENSIONS.contains(&ext) {
            return None;
        }
        path.file_stem()?.to_str()?.to_string()
    };

    Some(FunctionInfo {
        is_background: name.ends_with(BACKGROUND_SUFFIX),
        name,
        local_path: path.to_path_buf(),
    })
}

/// Starts the local functions runtime. Side-effect only.
#[async_trait]
pub trait FunctionsLauncher: Send + Sync {
    async fn start(
        &self,
        settings: &ServerSettings,
        site: &Site,
        site_info: Option<&SiteDetails>,
    ) -> Result<(), DevError>;
}

/// Launcher that lists the project's functions and announces their routes.
/// Serving them is left to the external functions runtime.
#[derive(Debug, Clone, Default)]
pub struct FunctionsCatalog;

#[async_trait]
impl FunctionsLauncher for FunctionsCatalog {
    async fn start(
        &self,
        settings: &ServerSettings,
        site: &Site,
        site_info: Option<&SiteDetails>,
    ) -> Result<(), DevError> {
        let Some(dir) = &settings.functions else {
            debug!("No functions directory configured");
            return Ok(());
        };
        let dir = if dir.is_absolute() {
            dir.clone()
        } else {
            site.root.join(dir)
        };

        let functions = get_functions(&dir);
        debug!(
            dir = %dir.display(),
            count = functions.len(),
            site = ?site_info.map(|s| s.id.as_str()),
            "Listed functions"
        );
        if functions.is_empty() {
            return Ok(());
        }

        emit(
            Severity::Info,
            format!(
                "Functions server is listening on {}",
                settings.functions_port
            ),
        );
        for function in &functions {
            let kind = if function.is_background { " (background)" } else { "" };
            emit(
                Severity::Info,
                format!("Loaded function {} at {}{}", function.name, function.route(), kind),
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_missing_dir_is_empty() {
        assert!(get_functions(Path::new("/definitely/not/here")).is_empty());
    }

    #[test]
    fn test_lists_sources_and_directories() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::write(root.join("hello.js"), "").unwrap();
        fs::write(root.join("report-background.ts"), "").unwrap();
        fs::write(root.join("bundle.zip"), "").unwrap();
        fs::write(root.join("README.md"), "").unwrap();
        fs::create_dir(root.join("api")).unwrap();
        fs::write(root.join("api").join("index.js"), "").unwrap();
        fs::create_dir(root.join("auth")).unwrap();
        fs::write(root.join("auth").join("auth.ts"), "").unwrap();
        fs::create_dir(root.join("assets")).unwrap();
        fs::write(root.join("assets").join("logo.png"), "").unwrap();

        let functions = get_functions(root);
        let names: Vec<&str> = functions.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["api", "auth", "bundle", "hello", "report-background"]);

        let background = functions.iter().find(|f| f.name == "report-background").unwrap();
        assert!(background.is_background);
        assert_eq!(background.route(), "/.netlify/functions/report-background");
        assert!(!functions[0].is_background);
        assert_eq!(functions[0].local_path, root.join("api"));
    }
}
