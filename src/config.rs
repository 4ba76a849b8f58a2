//! The optional `config.toml` of the freckles CLI
//!
//! Every section and key is optional; a missing file means defaults.

use crate::paths;
use anyhow::{Context, Result};
use frkl::{Abbreviations, ResolverConfig};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FrecklesConfig {
    /// Where runs are prepared and archived
    pub execution: ExecutionConfig,

    /// How the external engine is invoked
    pub engine: EngineConfig,

    /// Resolver behaviour
    pub resolver: ResolverSettings,

    /// Global task defaults, overridden by handler defaults and leaf vars
    pub defaults: Map<String, Value>,
}

impl FrecklesConfig {
    /// Load from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_file()?)
    }

    /// Load from a specific file, falling back to defaults if it is missing
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Invalid TOML format in {}", path.display()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Base directory; `FRECKLES_CACHE_DIR` wins over this
    pub base_dir: Option<String>,

    /// Keep every run's working directory under `archive/`
    pub archive: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            base_dir: None,
            archive: true,
        }
    }
}

impl ExecutionConfig {
    /// Effective base directory.
    pub fn base_dir(&self) -> Result<PathBuf> {
        let from_env = std::env::var_os(paths::ENV_CACHE_DIR).is_some();
        match (&self.base_dir, from_env) {
            (Some(dir), false) => Ok(paths::expand(dir)),
            _ => paths::cache_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Playbook runner executable
    pub command: String,

    /// Extra arguments appended to every invocation
    pub args: Vec<String>,

    /// Extra environment for the engine process
    pub env: BTreeMap<String, String>,

    /// Directory holding the event callback plugin; the bundled one is
    /// written into the working directory when unset
    pub callback_plugins: Option<String>,

    /// Name of the stdout callback plugin
    pub callback: String,

    /// Hosts of the `freckles` inventory group
    pub hosts: Vec<String>,

    /// Role installer executable
    pub galaxy: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            command: "ansible-playbook".to_string(),
            args: Vec::new(),
            env: BTreeMap::new(),
            callback_plugins: None,
            callback: "freckles_callback".to_string(),
            hosts: vec!["localhost".to_string()],
            galaxy: "ansible-galaxy".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverSettings {
    /// Render sources as templates before parsing
    pub templating: bool,

    /// Extra abbreviations: prefix to template parts, `{}` is a positional slot
    pub abbreviations: BTreeMap<String, Vec<String>>,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            templating: true,
            abbreviations: BTreeMap::new(),
        }
    }
}

impl ResolverSettings {
    /// Resolver parameters with these settings applied.
    pub fn resolver_config(&self) -> ResolverConfig {
        let mut abbreviations = Abbreviations::default();
        for (prefix, template) in &self.abbreviations {
            abbreviations.insert(prefix.clone(), Abbreviations::parse_template(template));
        }
        ResolverConfig {
            abbreviations,
            templating: self.templating,
            ..ResolverConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = FrecklesConfig::load_from(&dir.path().join("config.toml")).unwrap();

        assert!(config.execution.archive);
        assert_eq!(config.engine.command, "ansible-playbook");
        assert_eq!(config.engine.callback, "freckles_callback");
        assert_eq!(config.engine.hosts, vec!["localhost"]);
        assert!(config.resolver.templating);
        assert!(config.defaults.is_empty());
    }

    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[execution]
archive = false

[engine]
args = ["--diff"]
env = { ANSIBLE_NOCOLOR = "1" }

[resolver]
templating = false
abbreviations = { gl = ["https://gitlab.com", "{}", "{}", "-/raw/main"] }

[defaults]
pkg_mgr = "apt"
"#,
        )
        .unwrap();

        let config = FrecklesConfig::load_from(&path).unwrap();
        assert!(!config.execution.archive);
        assert_eq!(config.engine.command, "ansible-playbook");
        assert_eq!(config.engine.args, vec!["--diff"]);
        assert_eq!(config.engine.env["ANSIBLE_NOCOLOR"], "1");
        assert_eq!(config.defaults["pkg_mgr"], "apt");

        let resolver = config.resolver.resolver_config();
        assert!(!resolver.templating);
        assert!(resolver.abbreviations.contains("gl"));
        assert!(resolver.abbreviations.contains("gh"));
        assert_eq!(
            resolver.abbreviations.expand("gl:me/dots/x.yml").unwrap(),
            "https://gitlab.com/me/dots/-/raw/main/x.yml"
        );
    }

    #[test]
    fn test_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[execution\narchive = ").unwrap();

        let err = FrecklesConfig::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Invalid TOML"));
    }
}
