//! Process-backed execution engine
//!
//! Every run is written to the working directory, then `ansible-playbook` is
//! started with the event callback as stdout callback. Its stdout is streamed
//! line by line to the correlator; stderr and stdin stay attached to the
//! terminal so a become password prompt still works.

use super::workspace::{PreparedRun, Workspace};
use crate::config::{EngineConfig, FrecklesConfig};
use crate::runner;
use anyhow::{Context, Result};
use declarative::{EngineKind, ExecutionEngine, Run};
use std::io::{BufRead, BufReader, Read};
use std::process::{Command, Stdio};

/// Runs tasks through `ansible-playbook`.
pub struct ProcessEngine {
    engine: EngineConfig,
    workspace: Workspace,
    archive: bool,
    stamp: String,
}

impl ProcessEngine {
    pub fn new(config: &FrecklesConfig) -> Result<Self> {
        Ok(Self {
            engine: config.engine.clone(),
            workspace: Workspace::new(config.execution.base_dir()?),
            archive: config.execution.archive,
            stamp: chrono::Local::now().format("%Y%m%d_%H%M%S").to_string(),
        })
    }

    /// Arguments for the playbook invocation.
    fn arguments(&self, prepared: &PreparedRun, ask_become_pass: bool) -> Vec<String> {
        let mut args = vec![
            "-i".to_string(),
            prepared.inventory.display().to_string(),
        ];
        args.extend(self.engine.args.iter().cloned());
        if ask_become_pass {
            args.push("--ask-become-pass".to_string());
        }
        args.push(prepared.playbook.display().to_string());
        args
    }

    /// Environment for the playbook invocation, user settings last.
    fn environment(&self, prepared: &PreparedRun) -> Vec<(String, String)> {
        let roles_path = format!(
            "{}:{}",
            prepared.internal_roles.display(),
            prepared.external_roles.display()
        );
        let mut env = vec![
            (
                "ANSIBLE_STDOUT_CALLBACK".to_string(),
                self.engine.callback.clone(),
            ),
            (
                "ANSIBLE_CALLBACK_PLUGINS".to_string(),
                prepared.callback_plugins.display().to_string(),
            ),
            ("ANSIBLE_ROLES_PATH".to_string(), roles_path),
            ("PYTHONUNBUFFERED".to_string(), "1".to_string()),
        ];
        env.extend(
            self.engine
                .env
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        env
    }

    fn install_roles(&self, prepared: &PreparedRun) -> Result<()> {
        let Some(requirements) = &prepared.requirements else {
            return Ok(());
        };
        log::info!("Installing external roles from {}", requirements.display());

        let requirements = requirements.display().to_string();
        let target = prepared.external_roles.display().to_string();
        runner::run_capture(
            &self.engine.galaxy,
            &["install", "-r", &requirements, "-p", &target],
        )
        .context("Could not install external roles")?;
        Ok(())
    }
}

impl ExecutionEngine for ProcessEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::ansible()
    }

    fn execute(&mut self, run: &Run, on_line: &mut dyn FnMut(&str)) -> Result<bool> {
        if !runner::command_exists(&self.engine.command) {
            anyhow::bail!(
                "'{}' not found, is ansible installed and on the PATH?",
                self.engine.command
            );
        }

        let prepared = self.workspace.prepare(run, &self.engine)?;
        self.install_roles(&prepared)?;

        let ask_become_pass = run.needs_sudo() && !runner::passwordless_sudo();
        let args = self.arguments(&prepared, ask_become_pass);
        log::debug!("Running {} {}", self.engine.command, args.join(" "));

        let mut child = Command::new(&self.engine.command)
            .args(&args)
            .envs(self.environment(&prepared))
            .current_dir(&prepared.dir)
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("Failed to execute: {}", self.engine.command))?;

        // The child is always reaped and the run archived, even if reading failed.
        let streamed = match child.stdout.take() {
            Some(stdout) => stream_lines(stdout, on_line),
            None => Err(anyhow::anyhow!("Engine stdout was not captured")),
        };
        let status = child.wait().context("Engine process did not finish")?;
        log::debug!("Run #{} engine exited with {status}", run.index);

        if self.archive {
            self.workspace.archive(run.index, &self.stamp)?;
        }
        streamed?;
        Ok(status.success())
    }
}

/// Hand every line to `on_line`; bytes that aren't UTF-8 are replaced.
fn stream_lines(stdout: impl Read, on_line: &mut dyn FnMut(&str)) -> Result<()> {
    let mut reader = BufReader::new(stdout);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .context("Could not read engine output")?;
        if read == 0 {
            return Ok(());
        }
        let line = String::from_utf8_lossy(&buf);
        on_line(line.trim_end_matches(['\n', '\r']));
    }
}
