//! Package installation

use super::pkg_mgrs::{self, installer_item, needs_sudo, nix_step, update_item, upgrade_item};
use super::{DEFAULT_MARKER, checkout, dotfiles, flag, string_list};
use declarative::{Error, Expansion, Handler, HandlerInput, MaterializeContext, Result, RoleSpec};
use frkl::merge_maps;
use serde_json::{Map, Value, json};

/// Package manager value that lets the engine pick one.
pub const AUTO: &str = "auto";

/// Package manager value, and vars key, for applications that are skipped.
const NO_INSTALL: &str = "no_install";

/// Per-application key naming the packages, optionally per manager.
const PKGS_KEY: &str = "pkgs";

/// Installs applications, one task per package.
///
/// ```yaml
/// - install:
///     pkg_mgr: apt
///     update_cache: true
///     no_install: [emacs]
///     packages:
///       - git
///       - vim:
///           pkg_mgr: homebrew
///           pkgs:
///             homebrew: macvim
///             default: vim
/// ```
///
/// With `use_dotfiles`, every application folder of the `dotfiles`
/// repositories is installed too; a `.<manager>.frkl` file in the folder
/// picks its package manager.
pub struct Install;

impl Handler for Install {
    fn name(&self) -> &str {
        "install"
    }

    fn defaults(&self) -> Map<String, Value> {
        let mut defaults = Map::new();
        defaults.insert("pkg_mgr".to_string(), Value::from(AUTO));
        defaults.insert("state".to_string(), Value::from("present"));
        defaults
    }

    fn expand(&self, input: &HandlerInput, _ctx: &mut MaterializeContext) -> Result<Expansion> {
        let vars = &input.vars;
        let leaf_manager = text(vars, "pkg_mgr")?;
        let leaf_state = text(vars, "state")?;
        let leaf_sudo = flag(vars, "sudo")?;
        let ignored = string_list(vars, &[NO_INSTALL])?;

        let mut managers: Vec<String> = Vec::new();
        let mut packages = Vec::new();
        for (app, details) in applications(vars)? {
            if ignored.contains(&app) {
                log::debug!("Not installing '{app}': listed in {NO_INSTALL}");
                continue;
            }
            let manager = match optional_text(&details, "pkg_mgr")?.unwrap_or(leaf_manager) {
                "default" => AUTO,
                manager => manager,
            };
            if manager == NO_INSTALL {
                log::debug!("Not installing '{app}': package manager is {NO_INSTALL}");
                continue;
            }
            let spec = PackageSpec {
                manager,
                state: optional_text(&details, "state")?.unwrap_or(leaf_state),
                sudo: flag(&details, "sudo")?.or(leaf_sudo),
                options: options(manager, &details),
            };
            for package in package_names(&app, manager, &details)? {
                packages.push(spec.item(&app, &package)?);
            }
            if !managers.iter().any(|m| m == manager) {
                managers.push(manager.to_string());
            }
        }

        // Installers close the run, so they have to come before everything
        // that needs them.
        let mut items = Vec::new();
        let ensure = flag(vars, "ensure_pkg_manager")?;
        let mut installer_vars = Map::new();
        if let Some(add_path) = flag(vars, "add_path")? {
            installer_vars.insert("add_path".to_string(), Value::Bool(add_path));
        }
        for manager in &managers {
            if ensure.unwrap_or(manager == "homebrew")
                && let Some(item) = installer_item(manager, &installer_vars)
            {
                items.push(item);
            }
        }
        if flag(vars, "update_cache")?.unwrap_or(false) {
            for manager in &managers {
                items.extend(update_item(&pkg_mgrs::concrete(manager)?));
            }
        }
        if flag(vars, "upgrade_packages")?.unwrap_or(false) {
            for manager in &managers {
                items.extend(upgrade_item(&pkg_mgrs::concrete(manager)?));
            }
        }
        items.extend(packages);
        Ok(Expansion::new(items))
    }
}

fn text<'a>(vars: &'a Map<String, Value>, key: &str) -> Result<&'a str> {
    optional_text(vars, key)?.ok_or_else(|| Error::Bug(format!("no default for '{key}'")))
}

fn optional_text<'a>(vars: &'a Map<String, Value>, key: &str) -> Result<Option<&'a str>> {
    match vars.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(other) => Err(Error::config("expected a string", key, other)),
    }
}

/// Applications to install with their details, packages and dotfiles merged.
fn applications(vars: &Map<String, Value>) -> Result<Vec<(String, Map<String, Value>)>> {
    let from_packages = match ["packages", DEFAULT_MARKER]
        .iter()
        .find_map(|key| vars.get(*key).map(|value| (*key, value)))
    {
        Some((key, value)) => package_apps(key, value)?,
        None => Map::new(),
    };

    let from_dotfiles = if flag(vars, "use_dotfiles")?.unwrap_or(false) {
        dotfile_apps(vars)?
    } else {
        Map::new()
    };

    let merged = match optional_text(vars, "priority_source")?.unwrap_or("packages") {
        "packages" => merge_maps(&from_dotfiles, &from_packages),
        "dotfiles" => merge_maps(&from_packages, &from_dotfiles),
        other => {
            return Err(Error::config(
                "priority_source must be 'packages' or 'dotfiles'",
                "priority_source",
                other,
            ));
        }
    };

    Ok(merged
        .into_iter()
        .map(|(app, details)| match details {
            Value::Object(details) => (app, details),
            _ => (app, Map::new()),
        })
        .collect())
}

/// Applications given as names, `{name: details}` mappings, or a list of both.
fn package_apps(key: &str, value: &Value) -> Result<Map<String, Value>> {
    let mut apps = Map::new();
    let mut add = |name: &str, details: &Value| -> Result<()> {
        let details = match details {
            Value::Null => Map::new(),
            Value::Object(map) => map.clone(),
            other => return Err(Error::config("package details must be a mapping", name, other)),
        };
        apps.insert(name.to_string(), Value::Object(details));
        Ok(())
    };

    let entries: Vec<&Value> = match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };
    for entry in entries {
        match entry {
            Value::String(name) => add(name, &Value::Null)?,
            Value::Object(map) => {
                for (name, details) in map {
                    add(name, details)?;
                }
            }
            other => {
                return Err(Error::config(
                    "expected a package name or a mapping of package details",
                    key,
                    other,
                ));
            }
        }
    }
    Ok(apps)
}

/// One entry per application folder of the `dotfiles` repositories.
fn dotfile_apps(vars: &Map<String, Value>) -> Result<Map<String, Value>> {
    let mut apps = Map::new();
    for repo in dotfiles::sources(vars, &["dotfiles"])? {
        for dir in repo.app_dirs() {
            for app in dotfiles::applications(&dir)? {
                let mut details = Map::new();
                if let Some(manager) = dotfiles::marker_manager(&dir.join(&app)) {
                    details.insert("pkg_mgr".to_string(), Value::from(manager));
                }
                apps.insert(app, Value::Object(details));
            }
        }
    }
    Ok(apps)
}

/// Packages of one application for `manager`.
///
/// `pkgs` may be a name, a list, or a mapping from manager (or `default`) to
/// either; without it the application name is the package name.
fn package_names(app: &str, manager: &str, details: &Map<String, Value>) -> Result<Vec<Value>> {
    let chosen = match details.get(PKGS_KEY) {
        None | Some(Value::Null) => return Ok(vec![Value::from(app)]),
        Some(Value::Object(by_manager)) if manager != "git" => {
            match by_manager.get(manager).or_else(|| by_manager.get("default")) {
                Some(chosen) => chosen,
                None => {
                    log::debug!("No '{manager}' or default packages for '{app}'");
                    return Ok(Vec::new());
                }
            }
        }
        Some(other) => other,
    };
    Ok(match chosen {
        Value::Array(items) => items.clone(),
        other => vec![other.clone()],
    })
}

/// Module arguments a manager accepts besides the package name and state.
fn option_keys(manager: &str) -> &'static [&'static str] {
    match manager {
        "apt" | "deb" => &[
            "allow_unauthenticated",
            "autoremove",
            "cache_valid_time",
            "default_release",
            "dpkg_options",
            "force",
            "install_recommends",
            "only_upgrade",
            "purge",
            "update_cache",
        ],
        "yum" => &[
            "conf_file",
            "disable_gpg_check",
            "disablerepo",
            "enablerepo",
            "exclude",
            "skip_broken",
            "update_cache",
            "validate_certs",
        ],
        "homebrew" => &["install_options", "path"],
        "pip" => &["executable", "extra_args", "virtualenv"],
        _ => &[],
    }
}

/// Details that are module arguments of `manager`.
fn options(manager: &str, details: &Map<String, Value>) -> Map<String, Value> {
    details
        .iter()
        .filter(|(key, _)| option_keys(manager).contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// How the packages of one application are installed.
struct PackageSpec<'a> {
    manager: &'a str,
    state: &'a str,
    sudo: Option<bool>,
    options: Map<String, Value>,
}

impl PackageSpec<'_> {
    fn item(&self, app: &str, package: &Value) -> Result<Value> {
        match (self.manager, package) {
            ("git", Value::Object(repo)) => git_package(app, repo),
            ("git", other) => Err(Error::config(
                "git packages need a mapping with 'repo' and 'dest'",
                PKGS_KEY,
                other,
            )),
            (manager, Value::String(name)) => {
                let manager = if manager == "apt" && name.ends_with(".deb") {
                    "deb"
                } else {
                    manager
                };
                let mut item = package_item(name, manager, self.state, self.sudo);
                item["vars"]["pkg_options"] = Value::Object(self.options.clone());
                Ok(item)
            }
            (_, other) => Err(Error::config("expected a package name", app, other)),
        }
    }
}

fn git_package(app: &str, repo: &Map<String, Value>) -> Result<Value> {
    let field = |key: &str| {
        optional_text(repo, key)?.ok_or_else(|| {
            Error::config(
                format!("git package '{app}' needs a '{key}'"),
                key,
                Value::Object(repo.clone()),
            )
        })
    };
    let mut item = checkout::git_item(field("repo")?, field("dest")?);
    for key in ["version", "update"] {
        if let Some(value) = repo.get(key) {
            item["vars"][key] = value.clone();
        }
    }
    Ok(item)
}

/// Task item installing one package.
///
/// Packages sharing a manager share one generated role; the same package is
/// only installed once per invocation.
pub fn package_item(package: &str, manager: &str, state: &str, sudo: Option<bool>) -> Value {
    json!({
        "desc": "installing package",
        "item_name": package,
        "sudo": sudo.unwrap_or_else(|| needs_sudo(manager)),
        "unique_task_id": format!("install:{manager}:{package}"),
        "vars": {
            "pkg_name": package,
            "pkg_state": state,
            "pkg_options": {},
        },
        "role": package_role(manager),
    })
}

fn package_role(manager: &str) -> RoleSpec {
    let (name, mut step) = match manager {
        AUTO => ("install-pkg".to_string(), module_step("package", "name", &[])),
        "deb" => (
            "install-pkg-deb".to_string(),
            module_step("apt", "deb", option_keys("deb")),
        ),
        "nix" => ("install-pkg-nix".to_string(), nix_package_step()),
        "conda" => ("install-pkg-conda".to_string(), conda_package_step()),
        other => (
            format!("install-pkg-{other}"),
            module_step(other, "name", option_keys(other)),
        ),
    };
    step.insert("name".to_string(), Value::from("install {{ pkg_name }}"));
    RoleSpec {
        name,
        src: None,
        tasks: vec![Value::Object(step)],
    }
}

fn module_step(module: &str, name_key: &str, options: &[&str]) -> Map<String, Value> {
    let mut args = Map::new();
    args.insert(name_key.to_string(), Value::from("{{ pkg_name }}"));
    args.insert("state".to_string(), Value::from("{{ pkg_state }}"));
    for key in options {
        args.insert(
            (*key).to_string(),
            Value::from(format!("{{{{ pkg_options.{key} | default(omit) }}}}")),
        );
    }
    let mut step = Map::new();
    step.insert(module.to_string(), Value::Object(args));
    step
}

fn nix_package_step() -> Map<String, Value> {
    let command = "{% if pkg_state == 'absent' %}nix-env -e {{ pkg_name }}\
                   {% else %}nix-env -iA nixpkgs.{{ pkg_name }}{% endif %}";
    let mut step = match nix_step(command) {
        Value::Object(step) => step,
        _ => Map::new(),
    };
    step.insert("register".to_string(), Value::from("nix_result"));
    step.insert(
        "changed_when".to_string(),
        Value::from("'installing' in nix_result.stderr"),
    );
    step
}

fn conda_package_step() -> Map<String, Value> {
    let conda = "{{ ansible_env.HOME }}/{{ conda_rel_path | default('.freckles/opt') }}/conda/bin/conda";
    let mut step = Map::new();
    step.insert(
        "command".to_string(),
        Value::from(format!(
            "{conda} {{{{ 'remove' if pkg_state == 'absent' else 'install' }}}} -y {{{{ pkg_name }}}}"
        )),
    );
    step.insert("register".to_string(), Value::from("conda_result"));
    step.insert(
        "changed_when".to_string(),
        Value::from("'All requested packages already installed' not in conda_result.stdout"),
    );
    step
}
