use anyhow::{Context, Result};
use std::path::Path;
use std::process::{Command, Stdio};

/// Run a command and capture output
pub fn run_capture(cmd: &str, args: &[&str]) -> Result<String> {
    let output = Command::new(cmd)
        .args(args)
        .output()
        .with_context(|| format!("Failed to execute: {} {}", cmd, args.join(" ")))?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("Command failed: {}", stderr.trim())
    }
}

/// Run a command silently, returning success/failure
pub fn run_quiet(cmd: &str, args: &[&str]) -> bool {
    Command::new(cmd)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Check if a command exists
///
/// Commands given as a path are checked on disk, bare names via `which`.
pub fn command_exists(cmd: &str) -> bool {
    if cmd.contains('/') {
        return Path::new(cmd).is_file();
    }
    run_quiet("which", &[cmd])
}

/// Whether `sudo` works without asking for a password
pub fn passwordless_sudo() -> bool {
    command_exists("sudo") && run_quiet("sudo", &["-n", "true"])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_exists_by_path() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("tool");
        std::fs::write(&script, "#!/bin/sh\n").unwrap();

        assert!(command_exists(script.to_str().unwrap()));
        assert!(!command_exists(
            dir.path().join("missing").to_str().unwrap()
        ));
    }

    #[test]
    fn test_run_capture_missing_command() {
        let err = run_capture("freckles-no-such-command", &[]).unwrap_err();
        assert!(err.to_string().contains("Failed to execute"));
    }
}
