//! Working directory of one playbook run
//!
//! Layout under `<base>/build`:
//!
//! ```text
//! plays/freckles_playbook.yml
//! inventory/inventory.ini
//! tasks.json
//! roles/internal/<role>/tasks/main.yml
//! roles/external/               (installed by ansible-galaxy)
//! roles/requirements.yml        (only with external roles)
//! callback_plugins/freckles_callback.py
//! ```

use crate::config::EngineConfig;
use anyhow::{Context, Result};
use declarative::{RoleSpec, Run, TaskDescriptor};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Inventory group every play targets.
pub const INVENTORY_GROUP: &str = "freckles";

/// Role parameter the callback plugin reads the task id from.
pub const TASK_ID_PARAM: &str = "freckles_id";

const CALLBACK_PLUGIN: &str = include_str!("../../assets/freckles_callback.py");

/// Hosts that never need a connection.
const LOCAL_HOSTS: &[&str] = &["localhost", "127.0.0.1"];

/// Paths of a prepared run.
#[derive(Debug, Clone)]
pub struct PreparedRun {
    pub dir: PathBuf,
    pub playbook: PathBuf,
    pub inventory: PathBuf,
    pub requirements: Option<PathBuf>,
    pub internal_roles: PathBuf,
    pub external_roles: PathBuf,
    pub callback_plugins: PathBuf,
}

/// Base directory holding the build directory, archives and `last`.
#[derive(Debug, Clone)]
pub struct Workspace {
    base: PathBuf,
}

impl Workspace {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn build_dir(&self) -> PathBuf {
        self.base.join("build")
    }

    pub fn last_link(&self) -> PathBuf {
        self.base.join("last")
    }

    /// Recreate the build directory with everything the engine needs.
    pub fn prepare(&self, run: &Run, engine: &EngineConfig) -> Result<PreparedRun> {
        let dir = self.build_dir();
        if dir.exists() {
            fs::remove_dir_all(&dir)
                .with_context(|| format!("Could not remove {}", dir.display()))?;
        }

        let prepared = PreparedRun {
            playbook: dir.join("plays").join("freckles_playbook.yml"),
            inventory: dir.join("inventory").join("inventory.ini"),
            requirements: None,
            internal_roles: dir.join("roles").join("internal"),
            external_roles: dir.join("roles").join("external"),
            callback_plugins: match &engine.callback_plugins {
                Some(plugins) => crate::paths::expand(plugins),
                None => dir.join("callback_plugins"),
            },
            dir,
        };
        fs::create_dir_all(&prepared.internal_roles)?;
        fs::create_dir_all(&prepared.external_roles)?;

        let mut roles = Vec::with_capacity(run.len());
        for task in &run.tasks {
            roles.push(task.resolve_role()?);
        }

        write(&prepared.playbook, &to_yaml(&playbook(run, &roles))?)?;
        write(&prepared.inventory, &inventory(&engine.hosts))?;
        write(
            &prepared.dir.join("tasks.json"),
            &serde_json::to_string_pretty(&run.tasks)?,
        )?;

        let mut internal = BTreeMap::new();
        for role in roles.iter().filter(|r| r.is_internal()) {
            internal.entry(role.name.as_str()).or_insert(&role.tasks);
        }
        for (name, tasks) in internal {
            let path = prepared
                .internal_roles
                .join(name)
                .join("tasks")
                .join("main.yml");
            write(&path, &to_yaml(tasks)?)?;
        }

        let requirements = match requirements(run, &roles) {
            Some(list) => {
                let path = prepared.dir.join("roles").join("requirements.yml");
                write(&path, &to_yaml(&list)?)?;
                Some(path)
            }
            None => None,
        };

        if engine.callback_plugins.is_none() {
            write(
                &prepared
                    .callback_plugins
                    .join(format!("{}.py", engine.callback)),
                CALLBACK_PLUGIN,
            )?;
        }

        log::debug!("Prepared run #{} in {}", run.index, prepared.dir.display());
        Ok(PreparedRun {
            requirements,
            ..prepared
        })
    }

    /// Move the build directory to `archive/<stamp>/run_<n>` and point `last` at it.
    pub fn archive(&self, run_index: usize, stamp: &str) -> Result<PathBuf> {
        let target = self
            .base
            .join("archive")
            .join(stamp)
            .join(format!("run_{run_index}"));
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        if target.exists() {
            fs::remove_dir_all(&target)?;
        }
        fs::rename(self.build_dir(), &target)
            .with_context(|| format!("Could not archive run to {}", target.display()))?;

        self.link_last(&target)?;
        log::debug!("Archived run #{run_index} to {}", target.display());
        Ok(target)
    }

    #[cfg(unix)]
    fn link_last(&self, target: &Path) -> Result<()> {
        let link = self.last_link();
        if link.symlink_metadata().is_ok() {
            fs::remove_file(&link)
                .with_context(|| format!("Could not replace {}", link.display()))?;
        }
        std::os::unix::fs::symlink(target, &link)
            .with_context(|| format!("Could not link {}", link.display()))
    }

    #[cfg(not(unix))]
    fn link_last(&self, target: &Path) -> Result<()> {
        log::debug!("Not linking {} on this platform", target.display());
        Ok(())
    }
}

fn write(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Could not create {}", parent.display()))?;
    }
    fs::write(path, content).with_context(|| format!("Could not write {}", path.display()))
}

fn to_yaml<T: serde::Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_yaml::to_string(value).context("Could not serialize to YAML")
}

/// A single play applying one role entry per task, in task order.
fn playbook(run: &Run, roles: &[RoleSpec]) -> Value {
    let entries: Vec<Value> = run
        .tasks
        .iter()
        .zip(roles)
        .map(|(task, role)| {
            let mut entry = Map::new();
            entry.insert("role".to_string(), Value::from(role.name.clone()));
            entry.insert(TASK_ID_PARAM.to_string(), Value::from(task.id));
            entry.insert("become".to_string(), Value::Bool(task.sudo));
            if !task.vars.is_empty() {
                entry.insert("vars".to_string(), Value::Object(task.vars.clone()));
            }
            Value::Object(entry)
        })
        .collect();

    json!([{
        "hosts": INVENTORY_GROUP,
        "gather_facts": true,
        "roles": entries,
    }])
}

fn inventory(hosts: &[String]) -> String {
    let mut out = format!("[{INVENTORY_GROUP}]\n");
    for host in hosts {
        if LOCAL_HOSTS.contains(&host.as_str()) {
            out.push_str(&format!("{host} ansible_connection=local\n"));
        } else {
            out.push_str(&format!("{host}\n"));
        }
    }
    out
}

/// Galaxy requirements, if any role has to be fetched.
///
/// Covers the roles the tasks run and every other fetchable entry of their
/// `roles`, since those are usually dependencies of the former.
fn requirements<'a>(run: &'a Run, roles: &'a [RoleSpec]) -> Option<Vec<Value>> {
    let mut sources = BTreeMap::new();
    for role in roles.iter().filter(|r| !r.is_internal()) {
        match &role.src {
            Some(src) => {
                sources.entry(role.name.as_str()).or_insert(src.as_str());
            }
            None => log::debug!("Role '{}' has no source, expecting it installed", role.name),
        }
    }
    for (name, src) in run.tasks.iter().flat_map(TaskDescriptor::fetchable_roles) {
        sources.entry(name).or_insert(src);
    }
    if sources.is_empty() {
        return None;
    }
    Some(
        sources
            .into_iter()
            .map(|(name, src)| json!({"src": src, "name": name}))
            .collect(),
    )
}
