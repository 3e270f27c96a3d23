//! Site discovery: project root, config file and linked site id

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::CONFIG_FILE_NAME;
use crate::env::SessionEnvironment;

/// Environment variable that overrides the linked site id
pub const SITE_ID_VAR: &str = "NETLIFY_SITE_ID";

/// The local project and, when linked, its platform site
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Site {
    pub id: Option<String>,
    pub root: PathBuf,
    pub config_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LinkState {
    site_id: Option<String>,
}

impl Site {
    /// Locate the project from `cwd`.
    ///
    /// The nearest ancestor holding a netlify.toml is the project root; without
    /// one the working directory is used.
    pub fn discover(cwd: &Path, env: &SessionEnvironment) -> Self {
        let config_path = cwd
            .ancestors()
            .map(|dir| dir.join(CONFIG_FILE_NAME))
            .find(|candidate| candidate.is_file());
        let root = config_path
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_else(|| cwd.to_path_buf());

        let id = env
            .get(SITE_ID_VAR)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .or_else(|| read_linked_site_id(&root));

        debug!(root = %root.display(), config = ?config_path, site_id = ?id, "Discovered site");

        Self {
            id,
            root,
            config_path,
        }
    }
}

fn read_linked_site_id(root: &Path) -> Option<String> {
    let state_path = root.join(".netlify").join("state.json");
    let content = fs::read_to_string(&state_path).ok()?;
    match serde_json::from_str::<LinkState>(&content) {
        Ok(state) => state.site_id,
        Err(e) => {
            warn!(path = %state_path.display(), error = %e, "Ignoring unreadable link state");
            None
        }
    }
}
