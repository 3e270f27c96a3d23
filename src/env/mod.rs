//! Session environment and the variable merge sequence
//!
//! The session environment is the inherited process environment plus every
//! injected variable. It is passed by reference to each component that reads
//! or writes variables, and is what spawned subprocesses receive.
//!
//! Merge order, applied once before the framework starts:
//! 1. add-on variables, never overriding a key already present
//! 2. `NETLIFY_DEV=true`
//! 3. project dotfiles, overriding anything before them

pub mod addons;
pub mod dotfile;

use indexmap::IndexMap;
use std::ffi::OsStr;
use std::path::Path;
use tokio::process::Command;

pub use addons::{resolve_addon_variables, AddonResolution};
pub use dotfile::{apply_dotfile_variables, EnvFileResolution, DOTENV_FILES};

use crate::error::DevError;
use crate::util::{emit, Severity};

/// Dev-mode marker set before any subsystem starts
pub const NETLIFY_DEV: &str = "NETLIFY_DEV";
/// Final session URL
pub const URL: &str = "URL";
pub const DEPLOY_URL: &str = "DEPLOY_URL";
/// Public tunnel URL, only in live sessions
pub const BASE_URL: &str = "BASE_URL";

/// Ordered variable mapping shared by the session's components
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionEnvironment {
    vars: IndexMap<String, String>,
}

impl SessionEnvironment {
    /// Snapshot of the current process environment.
    ///
    /// Variables that are not valid UTF-8 are left out of the snapshot; they
    /// still reach children through [`SessionEnvironment::command`].
    pub fn inherit() -> Self {
        let vars = std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect();
        Self { vars }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    /// Insert or overwrite; an existing key keeps its position
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    /// Insert only when the key is absent. Returns whether the value was stored.
    pub fn set_if_absent(&mut self, key: &str, value: &str) -> bool {
        if self.vars.contains_key(key) {
            return false;
        }
        self.vars.insert(key.to_string(), value.to_string());
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Command for `program` running with the session environment: the
    /// process environment overlaid with every session variable
    pub fn command(&self, program: impl AsRef<OsStr>) -> Command {
        let mut cmd = Command::new(program);
        cmd.envs(self.iter());
        cmd
    }

    /// Publish the finalized session URL
    pub fn publish_url(&mut self, url: &str) {
        self.set(URL, url);
        self.set(DEPLOY_URL, url);
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for SessionEnvironment {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// Inject add-on variables without overriding variables already defined
pub fn inject_addon_variables(env: &mut SessionEnvironment, addons: &AddonResolution) {
    let mut injected = Vec::new();
    let mut ignored = Vec::new();
    for (key, value) in &addons.env {
        if env.set_if_absent(key, value) {
            injected.push(key.as_str());
        } else {
            ignored.push(key.as_str());
        }
    }

    if !injected.is_empty() {
        emit(
            Severity::Info,
            format!("Injected addon env vars: {}", injected.join(", ")),
        );
    }
    if !ignored.is_empty() {
        emit(
            Severity::Info,
            format!("Ignored addon env vars (defined in process): {}", ignored.join(", ")),
        );
    }
}

/// Fold add-on and dotfile variables into the session environment
pub fn merge_session_environment(
    env: &mut SessionEnvironment,
    addons: &AddonResolution,
    project_root: &Path,
) -> Result<EnvFileResolution, DevError> {
    inject_addon_variables(env, addons);
    env.set(NETLIFY_DEV, "true");
    apply_dotfile_variables(project_root, env)
}
