//! Centralized path resolution for freckles
//!
//! # Environment Variables
//!
//! - `FRECKLES_CONFIG_DIR` - Override config directory
//! - `FRECKLES_CACHE_DIR` - Override the execution base directory
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `FRECKLES_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/freckles` (if set)
//! 3. `~/.config/freckles`
//!
//! For cache_dir():
//! 1. `FRECKLES_CACHE_DIR` environment variable
//! 2. `~/.cache/freckles`

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "FRECKLES_CONFIG_DIR";

/// Environment variable for cache directory override
pub const ENV_CACHE_DIR: &str = "FRECKLES_CACHE_DIR";

/// Name of the configuration file inside the config directory.
pub const CONFIG_FILE: &str = "config.toml";

/// Get the freckles config directory path
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!(
            "Using config dir from {}: {}",
            ENV_CONFIG_DIR,
            path.display()
        );
        return Ok(path);
    }

    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config).join("freckles");
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".config").join("freckles");
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// Path of the configuration file.
pub fn config_file() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE))
}

/// Get the base directory for run working directories and archives
pub fn cache_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_CACHE_DIR) {
        let path = expand(&dir);
        log::debug!("Using cache dir from {}: {}", ENV_CACHE_DIR, path.display());
        return Ok(path);
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".cache").join("freckles"))
}

/// Expand ~ and environment variables in a path string.
///
/// Unknown variables are left as they are.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    /// Helper to run a test with temporary env var
    fn with_env_var<F, R>(key: &str, value: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let original = env::var(key).ok();
        // SAFETY: each test uses its own variable
        unsafe { env::set_var(key, value) };
        let result = f();
        match original {
            // SAFETY: as above
            Some(v) => unsafe { env::set_var(key, v) },
            None => unsafe { env::remove_var(key) },
        }
        result
    }

    #[test]
    fn test_config_dir_env_override() {
        with_env_var(ENV_CONFIG_DIR, "/custom/config/path", || {
            assert_eq!(config_dir().unwrap(), PathBuf::from("/custom/config/path"));
            assert_eq!(
                config_file().unwrap(),
                PathBuf::from("/custom/config/path/config.toml")
            );
        });
    }

    #[test]
    fn test_cache_dir_env_override_with_tilde() {
        let home = dirs::home_dir().unwrap();
        with_env_var(ENV_CACHE_DIR, "~/freckles-cache-test", || {
            assert_eq!(cache_dir().unwrap(), home.join("freckles-cache-test"));
        });
    }

    #[test]
    fn test_expand_with_tilde() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(expand("~/dotfiles"), home.join("dotfiles"));
    }

    #[test]
    fn test_expand_with_env_var() {
        with_env_var("FRECKLES_TEST_VAR", "test_value", || {
            assert_eq!(
                expand("/path/$FRECKLES_TEST_VAR/file"),
                PathBuf::from("/path/test_value/file")
            );
        });
    }

    #[test]
    fn test_expand_unknown_env_var_unchanged() {
        let result = expand("/path/$NONEXISTENT_VAR_12345/file");
        assert_eq!(result, PathBuf::from("/path/$NONEXISTENT_VAR_12345/file"));
    }
}
