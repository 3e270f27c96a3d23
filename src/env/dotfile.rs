//! Project dotfile variables (.env, .env.development)

use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::SessionEnvironment;
use crate::error::DevError;
use crate::util::{emit, Severity};

/// Dotfiles read from the project root, lowest precedence first
pub const DOTENV_FILES: &[&str] = &[".env", ".env.development"];

/// Variables contributed by each dotfile, in application order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvFileResolution {
    pub files: Vec<(PathBuf, Vec<(String, String)>)>,
}

impl EnvFileResolution {
    pub fn is_empty(&self) -> bool {
        self.files.iter().all(|(_, vars)| vars.is_empty())
    }

    /// Distinct variable names, first occurrence order
    pub fn var_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for (_, vars) in &self.files {
            for (key, _) in vars {
                if !names.contains(&key.as_str()) {
                    names.push(key.as_str());
                }
            }
        }
        names
    }
}

/// Parse the given dotfiles in order. Missing files are skipped, unparseable ones warned about.
pub fn read_env_files(files: &[PathBuf]) -> EnvFileResolution {
    let mut resolution = EnvFileResolution::default();
    for path in files {
        if !path.is_file() {
            continue;
        }
        let iter = match dotenvy::from_path_iter(path) {
            Ok(iter) => iter,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to open env file");
                continue;
            }
        };
        match iter.collect::<Result<Vec<(String, String)>, _>>() {
            Ok(vars) => {
                debug!(path = %path.display(), count = vars.len(), "Parsed env file");
                resolution.files.push((path.clone(), vars));
            }
            Err(e) => {
                emit(
                    Severity::Warn,
                    format!("Skipping {}: {}", path.display(), e),
                );
            }
        }
    }
    resolution
}

/// User line naming the dotfiles and the variables they set. Values are left out.
pub fn loaded_message(resolution: &EnvFileResolution, project_root: &Path) -> String {
    let file_names: Vec<String> = resolution
        .files
        .iter()
        .map(|(path, _)| {
            path.strip_prefix(project_root)
                .unwrap_or(path)
                .display()
                .to_string()
        })
        .collect();
    format!(
        "Adding the following env variables from {}: {}",
        file_names.join(", "),
        resolution.var_names().join(", ")
    )
}

/// Read the project's dotfiles and write their variables into the session
/// environment; later files override earlier ones.
pub fn apply_dotfile_variables(
    project_root: &Path,
    env: &mut SessionEnvironment,
) -> Result<EnvFileResolution, DevError> {
    let files: Vec<PathBuf> = DOTENV_FILES.iter().map(|f| project_root.join(f)).collect();
    let resolution = read_env_files(&files);
    if resolution.is_empty() {
        return Ok(resolution);
    }

    for (_, vars) in &resolution.files {
        for (key, value) in vars {
            env.set(key.as_str(), value.as_str());
        }
    }

    emit(Severity::Info, loaded_message(&resolution, project_root));

    Ok(resolution)
}
