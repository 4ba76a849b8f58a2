//! Task handlers shipped with the CLI
//!
//! Registration order matters: the first handler whose predicate accepts a
//! leaf wins, so the catch-all `task` handler comes last.

mod checkout;
mod debug_vars;
mod dotfiles;
mod files;
mod install;
mod pkg_mgrs;
mod role;
mod stow;
mod task;

pub use checkout::{CheckoutDotfiles, GitRepo};
pub use debug_vars::DebugVars;
pub use files::{Delete, Folders};
pub use install::Install;
pub use pkg_mgrs::{InstallManager, Maintain};
pub use role::ApplyRole;
pub use stow::Stow;
pub use task::AdHocTask;

use crate::paths;
use declarative::{Error, HandlerRegistry, Result};
use serde_json::{Map, Value};
use std::path::PathBuf;

/// Key holding a value given without a name, e.g. `folders: ~/projects`.
pub const DEFAULT_MARKER: &str = "frkl_default";

/// Registry with every built-in handler.
pub fn registry() -> HandlerRegistry {
    HandlerRegistry::new()
        .with(Install)
        .with(Stow)
        .with(CheckoutDotfiles)
        .with(GitRepo)
        .with(InstallManager::NIX)
        .with(InstallManager::CONDA)
        .with(InstallManager::BREW)
        .with(Maintain::UPDATE)
        .with(Maintain::UPGRADE)
        .with(Folders)
        .with(Delete)
        .with(DebugVars)
        .with(ApplyRole)
        .with(AdHocTask)
}

/// Strings under the first of `keys` present in `vars`.
///
/// Accepts a single string or a list of strings; a missing key gives an
/// empty list.
pub fn string_list(vars: &Map<String, Value>, keys: &[&str]) -> Result<Vec<String>> {
    let Some((key, value)) = keys
        .iter()
        .find_map(|key| vars.get(*key).map(|value| (*key, value)))
    else {
        return Ok(Vec::new());
    };

    let invalid = || Error::config("expected a string or a list of strings", key, value);
    match value {
        Value::Null => Ok(Vec::new()),
        Value::String(s) => Ok(vec![s.clone()]),
        Value::Array(items) => items
            .iter()
            .map(|item| item.as_str().map(str::to_string).ok_or_else(invalid))
            .collect(),
        _ => Err(invalid()),
    }
}

/// Optional boolean under `key`.
pub fn flag(vars: &Map<String, Value>, key: &str) -> Result<Option<bool>> {
    match vars.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(other) => Err(Error::config("expected true or false", key, other)),
    }
}

/// Expand `~` and variables; relative paths are taken from the home directory.
pub fn absolute(path: &str) -> PathBuf {
    let expanded = paths::expand(path);
    if expanded.is_absolute() {
        return expanded;
    }
    match dirs::home_dir() {
        Some(home) => home.join(expanded),
        None => expanded,
    }
}
