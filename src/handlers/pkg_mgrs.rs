//! Package manager setup and maintenance
//!
//! Installing a package manager closes the current run, so the tasks using
//! it run in a fresh engine process that sees its paths.

use super::install::AUTO;
use super::{DEFAULT_MARKER, string_list};
use crate::runner;
use declarative::{Error, Expansion, Handler, HandlerInput, MaterializeContext, Result, RoleSpec};
use serde_json::{Map, Value, json};
use std::path::Path;

/// Priority of package manager installs.
pub const INSTALL_MANAGER_PRIORITY: i64 = 10;

/// Priority of package cache updates.
pub const UPDATE_PRIORITY: i64 = 100;

/// Priority of package upgrades.
pub const UPGRADE_PRIORITY: i64 = 500;

/// Where conda is installed, relative to the home directory.
pub const CONDA_REL_PATH: &str = ".freckles/opt";

/// Managers whose packages install as the invoking user.
const USER_MANAGERS: &[&str] = &["homebrew", "nix", "conda", "pip", "npm", "cargo", "git"];

const NIX_INSTALLER_URL: &str = "https://nixos.org/nix/install";
const NIX_PROFILE: &str = ". {{ ansible_env.HOME }}/.nix-profile/etc/profile.d/nix.sh";
const HOMEBREW_ROLE: &str = "install_brew";
const HOMEBREW_ROLE_SRC: &str = "https://github.com/geerlingguy/ansible-role-homebrew.git";
const CLT_ROLE: &str = "elliotweiser.osx-command-line-tools";
const CLT_ROLE_SRC: &str = "https://github.com/elliotweiser/ansible-osx-command-line-tools.git";

/// Whether installing with `manager` needs elevated privileges.
pub fn needs_sudo(manager: &str) -> bool {
    !USER_MANAGERS.contains(&manager)
}

/// The system's native package manager, if known.
pub fn default_manager() -> Option<&'static str> {
    if cfg!(target_os = "macos") {
        Some("homebrew")
    } else if Path::new("/etc/debian_version").exists() {
        Some("apt")
    } else if Path::new("/etc/redhat-release").exists() {
        Some("yum")
    } else {
        None
    }
}

/// `manager`, with `auto` and `default` replaced by the native one.
pub fn concrete(manager: &str) -> Result<String> {
    if manager != AUTO && manager != "default" {
        return Ok(manager.to_string());
    }
    default_manager().map(str::to_string).ok_or_else(|| {
        Error::config(
            "Can't find the default package manager for this system",
            "pkg_mgr",
            manager,
        )
    })
}

/// Task installing `manager` itself, for managers freckles can bootstrap.
///
/// `vars` are added to the installer's own vars, e.g. `add_path`.
pub fn installer_item(manager: &str, vars: &Map<String, Value>) -> Option<Value> {
    let mut item = match manager {
        "nix" => json!({
            "item_name": "nix",
            "sudo": !runner::run_quiet("test", &["-w", "/nix"]),
            "unique_task_id": "install_nix",
            "vars": {},
            "role": nix_installer(),
        }),
        "conda" => json!({
            "item_name": "conda",
            "sudo": false,
            "unique_task_id": "install_conda",
            "vars": {"conda_rel_path": CONDA_REL_PATH},
            "role": conda_installer(),
        }),
        "homebrew" => json!({
            "item_name": "homebrew",
            "sudo": false,
            "unique_task_id": "install_brew",
            "vars": {},
            "role": HOMEBREW_ROLE,
            "roles": {HOMEBREW_ROLE: HOMEBREW_ROLE_SRC, CLT_ROLE: CLT_ROLE_SRC},
        }),
        _ => return None,
    };
    item["desc"] = Value::from("install package manager");
    item["priority"] = Value::from(INSTALL_MANAGER_PRIORITY);
    item["new_run_after_this"] = Value::Bool(true);
    if let Some(own) = item["vars"].as_object_mut() {
        for (key, value) in vars {
            own.insert(key.clone(), value.clone());
        }
    }
    Some(item)
}

fn nix_installer() -> RoleSpec {
    RoleSpec {
        name: "install-nix".to_string(),
        src: None,
        tasks: vec![
            json!({
                "name": "create /nix",
                "file": {"path": "/nix", "state": "directory", "owner": "{{ ansible_user_id }}"},
            }),
            json!({
                "name": "download nix installer",
                "get_url": {"url": NIX_INSTALLER_URL, "dest": "/tmp/freckles-install-nix.sh", "mode": "0755"},
                "become": false,
            }),
            json!({
                "name": "install nix",
                "command": "/tmp/freckles-install-nix.sh --no-daemon",
                "args": {"creates": "{{ ansible_env.HOME }}/.nix-profile"},
                "become": false,
            }),
            json!({
                "name": "add nix to the profile",
                "lineinfile": {"path": "{{ ansible_env.HOME }}/.profile", "line": NIX_PROFILE, "create": true},
                "when": "add_path | default(false) | bool",
                "become": false,
            }),
        ],
    }
}

fn conda_installer() -> RoleSpec {
    let prefix = "{{ ansible_env.HOME }}/{{ conda_rel_path }}/conda";
    RoleSpec {
        name: "install-conda".to_string(),
        src: None,
        tasks: vec![
            json!({
                "name": "download conda installer",
                "get_url": {
                    "url": "https://repo.anaconda.com/miniconda/Miniconda3-latest-{{ 'MacOSX' if ansible_system == 'Darwin' else 'Linux' }}-{{ ansible_architecture }}.sh",
                    "dest": "/tmp/freckles-install-conda.sh",
                    "mode": "0755",
                },
            }),
            json!({
                "name": "install conda",
                "command": format!("/tmp/freckles-install-conda.sh -b -p {prefix}"),
                "args": {"creates": prefix},
            }),
            json!({
                "name": "add conda to the profile",
                "lineinfile": {
                    "path": "{{ ansible_env.HOME }}/.profile",
                    "line": format!("export PATH=\"{prefix}/bin:$PATH\""),
                    "create": true,
                },
                "when": "add_path | default(false) | bool",
            }),
        ],
    }
}

/// Step running a nix command with the user's nix profile loaded.
pub fn nix_step(command: &str) -> Value {
    json!({"shell": format!("{NIX_PROFILE} && {command}")})
}

/// Task refreshing the package cache of `manager`, if it has one.
pub fn update_item(manager: &str) -> Option<Value> {
    let step = match manager {
        "apt" => json!({"apt": {"update_cache": true}}),
        "homebrew" => json!({"homebrew": {"update_homebrew": true}}),
        "nix" => nix_step("nix-channel --update"),
        _ => return None,
    };
    Some(maintenance_item(
        manager,
        "update",
        format!("{manager} package cache"),
        UPDATE_PRIORITY,
        step,
    ))
}

/// Task upgrading every package installed with `manager`, if supported.
pub fn upgrade_item(manager: &str) -> Option<Value> {
    let step = match manager {
        "apt" => json!({"apt": {"upgrade": "dist"}}),
        "yum" => json!({"yum": {"name": "*", "state": "latest"}}),
        "homebrew" => json!({"homebrew": {"upgrade_all": true}}),
        "nix" => nix_step("nix-env --upgrade"),
        _ => return None,
    };
    Some(maintenance_item(
        manager,
        "upgrade",
        format!("{manager} packages"),
        UPGRADE_PRIORITY,
        step,
    ))
}

fn maintenance_item(
    manager: &str,
    action: &str,
    item_name: String,
    priority: i64,
    mut step: Value,
) -> Value {
    step["name"] = Value::from(format!("{action} {manager}"));
    let role = RoleSpec {
        name: format!("{action}-{manager}"),
        src: None,
        tasks: vec![step],
    };
    json!({
        "desc": action,
        "item_name": item_name,
        "sudo": needs_sudo(manager),
        "priority": priority,
        "unique_task_id": format!("{action}:{manager}"),
        "vars": {},
        "role": role,
    })
}

/// Installs one package manager.
///
/// ```yaml
/// - install-nix:
///     add_path: true
/// ```
pub struct InstallManager {
    name: &'static str,
    manager: &'static str,
}

impl InstallManager {
    pub const NIX: Self = Self {
        name: "install-nix",
        manager: "nix",
    };
    pub const CONDA: Self = Self {
        name: "install-conda",
        manager: "conda",
    };
    pub const BREW: Self = Self {
        name: "install-brew",
        manager: "homebrew",
    };
}

impl Handler for InstallManager {
    fn name(&self) -> &str {
        self.name
    }

    fn expand(&self, input: &HandlerInput, _ctx: &mut MaterializeContext) -> Result<Expansion> {
        let item = installer_item(self.manager, &input.vars)
            .ok_or_else(|| Error::Bug(format!("no installer for '{}'", self.manager)))?;
        Ok(Expansion::single(item))
    }
}

/// Package manager maintenance: refreshing caches or upgrading everything.
///
/// ```yaml
/// - update-package-cache:
///     pkg_mgrs: [apt, nix]
/// - upgrade-all-packages
/// ```
pub struct Maintain {
    name: &'static str,
    item: fn(&str) -> Option<Value>,
}

impl Maintain {
    pub const UPDATE: Self = Self {
        name: "update-package-cache",
        item: update_item,
    };
    pub const UPGRADE: Self = Self {
        name: "upgrade-all-packages",
        item: upgrade_item,
    };
}

impl Handler for Maintain {
    fn name(&self) -> &str {
        self.name
    }

    fn expand(&self, input: &HandlerInput, _ctx: &mut MaterializeContext) -> Result<Expansion> {
        let mut managers = string_list(&input.vars, &["pkg_mgrs", "pkg_mgr", DEFAULT_MARKER])?;
        if managers.is_empty() {
            managers.push(AUTO.to_string());
        }

        let mut items = Vec::new();
        for manager in managers {
            let manager = concrete(&manager)?;
            match (self.item)(&manager) {
                Some(item) => items.push(item),
                None => log::debug!("Nothing to do for '{manager}' in {}", self.name),
            }
        }
        Ok(Expansion::new(items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::testing::materialize;

    #[test]
    fn test_update_skips_managers_without_cache() {
        let out = materialize(vec![json!({
            "meta": {"name": "update-package-cache"},
            "vars": {"pkg_mgrs": ["apt", "yum", "homebrew"]},
        })])
        .unwrap();

        let run = &out.runs[0];
        let names: Vec<_> = run.tasks.iter().map(|t| t.item_name.as_str()).collect();
        assert_eq!(names, vec!["apt package cache", "homebrew package cache"]);

        let apt = &run.tasks[0];
        assert_eq!(apt.description, "update");
        assert_eq!(apt.priority, UPDATE_PRIORITY);
        assert!(apt.sudo);
        assert!(!run.tasks[1].sudo);
        assert_eq!(apt.unique_task_id.as_deref(), Some("update:apt"));
        let role = apt.resolve_role().unwrap();
        assert_eq!(role.name, "update-apt");
        assert_eq!(role.tasks[0]["apt"]["update_cache"], true);
    }

    #[test]
    fn test_upgrade() {
        let out = materialize(vec![json!({
            "meta": {"name": "upgrade-all-packages"},
            "vars": {"pkg_mgr": "yum"},
        })])
        .unwrap();

        let task = &out.runs[0].tasks[0];
        assert_eq!(task.item_name, "yum packages");
        assert_eq!(task.priority, UPGRADE_PRIORITY);
        let step = &task.resolve_role().unwrap().tasks[0];
        assert_eq!(step["yum"], json!({"name": "*", "state": "latest"}));
        assert_eq!(step["name"], "upgrade yum");
    }

    #[test]
    fn test_nix_steps_load_profile() {
        let step = nix_step("nix-env --upgrade");
        let shell = step["shell"].as_str().unwrap();
        assert!(shell.starts_with(". {{ ansible_env.HOME }}/.nix-profile"));
        assert!(shell.ends_with("&& nix-env --upgrade"));
    }

    #[test]
    fn test_installer_closes_run() {
        let out = materialize(vec![
            json!({"meta": {"name": "install-conda"}, "vars": {"add_path": true}}),
            json!({"meta": {"name": "folders"}, "vars": {"folders": "/opt/tools"}}),
        ])
        .unwrap();

        assert_eq!(out.runs.len(), 2);
        let conda = &out.runs[0].tasks[0];
        assert_eq!(conda.item_name, "conda");
        assert_eq!(conda.description, "install package manager");
        assert_eq!(conda.priority, INSTALL_MANAGER_PRIORITY);
        assert!(conda.new_run_after_this);
        assert_eq!(conda.vars["conda_rel_path"], CONDA_REL_PATH);
        assert_eq!(conda.vars["add_path"], true);
        assert_eq!(out.runs[1].tasks[0].item_name, "/opt/tools");
    }

    #[test]
    fn test_brew_installer_selects_role() {
        let out = materialize(vec![json!({"meta": {"name": "install-brew"}})]).unwrap();

        let task = &out.runs[0].tasks[0];
        let role = task.resolve_role().unwrap();
        assert_eq!(role.name, HOMEBREW_ROLE);
        assert_eq!(role.src.as_deref(), Some(HOMEBREW_ROLE_SRC));
        let fetched: Vec<_> = task.fetchable_roles().map(|(name, _)| name).collect();
        assert_eq!(fetched, vec![CLT_ROLE, HOMEBREW_ROLE]);
    }

    #[test]
    fn test_installer_only_once() {
        let out = materialize(vec![
            json!({"meta": {"name": "install-nix"}}),
            json!({"meta": {"name": "install-nix"}}),
        ])
        .unwrap();
        assert_eq!(out.task_count(), 1);
    }

    #[test]
    fn test_concrete_manager() {
        assert_eq!(concrete("nix").unwrap(), "nix");
        match default_manager() {
            Some(native) => assert_eq!(concrete(AUTO).unwrap(), native),
            None => assert!(concrete("default").is_err()),
        }
    }

    #[test]
    fn test_needs_sudo() {
        assert!(needs_sudo("apt"));
        assert!(needs_sudo(AUTO));
        assert!(!needs_sudo("nix"));
        assert!(!needs_sudo("homebrew"));
    }
}
