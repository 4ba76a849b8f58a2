//! Dotfile repositories and the applications in them

use super::{absolute, string_list};
use declarative::{Error, Result};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

/// Where dotfiles live when no `base_dir` is given.
pub const DEFAULT_DOTFILES_DIR: &str = "~/dotfiles";

/// Suffix of the marker file naming an application's package manager,
/// e.g. `.nix.frkl`.
const MARKER_SUFFIX: &str = ".frkl";

/// One dotfile repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DotfileSource {
    /// Git remote to check the repository out from.
    pub remote: Option<String>,
    pub base_dir: PathBuf,
    /// Subfolders holding application folders; empty means `base_dir` itself.
    pub paths: Vec<String>,
}

impl DotfileSource {
    /// Directories whose subfolders are applications.
    pub fn app_dirs(&self) -> Vec<PathBuf> {
        if self.paths.is_empty() {
            return vec![self.base_dir.clone()];
        }
        self.paths.iter().map(|p| self.base_dir.join(p)).collect()
    }
}

/// Dotfile repositories under the first of `keys` present in `vars`.
///
/// An entry is a local path, a git remote (checked out to the default
/// directory) or a mapping with `remote`, `base_dir` and `paths`.
pub fn sources(vars: &Map<String, Value>, keys: &[&str]) -> Result<Vec<DotfileSource>> {
    let Some((key, value)) = keys
        .iter()
        .find_map(|key| vars.get(*key).map(|value| (*key, value)))
    else {
        return Ok(Vec::new());
    };

    let entries: Vec<&Value> = match value {
        Value::Null => return Ok(Vec::new()),
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };
    entries.into_iter().map(|entry| source(key, entry)).collect()
}

fn source(key: &str, entry: &Value) -> Result<DotfileSource> {
    match entry {
        Value::String(s) if is_remote(s) => Ok(DotfileSource {
            remote: Some(s.clone()),
            base_dir: absolute(DEFAULT_DOTFILES_DIR),
            paths: Vec::new(),
        }),
        Value::String(s) => Ok(DotfileSource {
            remote: None,
            base_dir: absolute(s),
            paths: Vec::new(),
        }),
        Value::Object(map) => {
            let base_dir = text(map, "base_dir")?.unwrap_or_else(|| DEFAULT_DOTFILES_DIR.to_string());
            Ok(DotfileSource {
                remote: text(map, "remote")?,
                base_dir: absolute(&base_dir),
                paths: string_list(map, &["paths"])?,
            })
        }
        other => Err(Error::config(
            "expected a path, a git remote or a mapping",
            key,
            other,
        )),
    }
}

fn text(map: &Map<String, Value>, key: &str) -> Result<Option<String>> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(Error::config("expected a string", key, other)),
    }
}

/// Whether a dotfiles entry names a git remote rather than a local path.
fn is_remote(entry: &str) -> bool {
    entry.contains("://") || entry.starts_with("git@")
}

/// Sorted names of the non-hidden subfolders of `dir`.
pub fn applications(dir: &Path) -> Result<Vec<String>> {
    if !dir.is_dir() {
        log::warn!("Dotfile directory {} does not exist, skipping", dir.display());
        return Ok(Vec::new());
    }

    let entries = fs::read_dir(dir).map_err(|e| {
        Error::Engine(anyhow::anyhow!(
            "Could not read dotfile directory {}: {e}",
            dir.display()
        ))
    })?;

    let mut apps = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("Skipping unreadable entry in {}: {e}", dir.display());
                continue;
            }
        };
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) if name.starts_with('.') => {}
            Ok(name) => apps.push(name),
            Err(_) => log::warn!("Skipping {}: name is not valid UTF-8", path.display()),
        }
    }
    apps.sort();
    Ok(apps)
}

/// Package manager named by a `.<manager>.frkl` marker file in `app_dir`.
pub fn marker_manager(app_dir: &Path) -> Option<String> {
    let entries = match fs::read_dir(app_dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!("Could not read {}: {e}", app_dir.display());
            return None;
        }
    };

    let mut found = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("Skipping unreadable entry in {}: {e}", app_dir.display());
                continue;
            }
        };
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if let Some(manager) = name
            .strip_prefix('.')
            .and_then(|rest| rest.strip_suffix(MARKER_SUFFIX))
            .filter(|manager| !manager.is_empty())
        {
            found.push(manager.to_string());
        }
    }
    found.sort();
    if found.len() > 1 {
        log::warn!(
            "Several package manager markers in {}, using '{}'",
            app_dir.display(),
            found[0]
        );
    }
    found.into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_source_shapes() {
        let home = dirs::home_dir().unwrap();
        let v = vars(json!({"dotfiles": [
            "https://github.com/me/dotfiles.git",
            "/srv/dots",
            {"remote": "git@github.com:me/work.git", "base_dir": "~/work", "paths": ["linux", "common"]},
        ]}));

        let sources = sources(&v, &["dotfiles"]).unwrap();
        assert_eq!(sources.len(), 3);
        assert_eq!(
            sources[0].remote.as_deref(),
            Some("https://github.com/me/dotfiles.git")
        );
        assert_eq!(sources[0].base_dir, home.join("dotfiles"));
        assert_eq!(sources[1].remote, None);
        assert_eq!(sources[1].app_dirs(), vec![PathBuf::from("/srv/dots")]);
        assert_eq!(
            sources[2].app_dirs(),
            vec![home.join("work/linux"), home.join("work/common")]
        );
    }

    #[test]
    fn test_invalid_source() {
        let v = vars(json!({"dotfiles": [3]}));
        assert!(sources(&v, &["dotfiles"]).is_err());
        let v = vars(json!({"dotfiles": {"remote": 3}}));
        assert!(sources(&v, &["dotfiles"]).is_err());
        assert!(sources(&Map::new(), &["dotfiles"]).unwrap().is_empty());
    }

    #[test]
    fn test_applications() {
        let dir = tempfile::tempdir().unwrap();
        for app in ["zsh", "git", ".git"] {
            fs::create_dir(dir.path().join(app)).unwrap();
        }
        fs::write(dir.path().join("README.md"), "dotfiles").unwrap();

        assert_eq!(applications(dir.path()).unwrap(), vec!["git", "zsh"]);
        assert!(applications(&dir.path().join("missing")).unwrap().is_empty());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_non_utf8_folder_skipped() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("vim")).unwrap();
        fs::create_dir(dir.path().join(OsStr::from_bytes(b"bad\xff"))).unwrap();

        assert_eq!(applications(dir.path()).unwrap(), vec!["vim"]);
    }

    #[test]
    fn test_marker_manager() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(marker_manager(dir.path()), None);

        fs::write(dir.path().join(".nix.frkl"), "").unwrap();
        fs::write(dir.path().join("init.vim"), "").unwrap();
        assert_eq!(marker_manager(dir.path()).as_deref(), Some("nix"));

        fs::write(dir.path().join(".conda.frkl"), "").unwrap();
        assert_eq!(marker_manager(dir.path()).as_deref(), Some("conda"));
    }
}
