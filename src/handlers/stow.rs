//! Dotfile linking with GNU stow

use super::install::{AUTO, package_item};
use super::{DEFAULT_MARKER, absolute, dotfiles};
use declarative::types::{DEFAULT_PRIORITY, PRIORITY_STEP};
use declarative::{
    Error, Expansion, Handler, HandlerInput, MaterializeContext, Result, RoleSpec, keys,
};
use serde_json::{Map, Value, json};

const STOW_ROLE: &str = "ansible-stow";
const STOW_ROLE_SRC: &str = "https://github.com/makkus/ansible-stow";

/// Links every application folder of one or more dotfile directories.
///
/// Each direct subfolder of a dotfile directory is one stow package. The
/// `stow` package itself is installed first.
pub struct Stow;

impl Handler for Stow {
    fn name(&self) -> &str {
        "stow"
    }

    fn defaults(&self) -> Map<String, Value> {
        let mut defaults = Map::new();
        defaults.insert("dotfiles".to_string(), json!(["~/dotfiles"]));
        defaults.insert("stow_target_dir".to_string(), Value::from("~"));
        defaults
    }

    fn expand(&self, input: &HandlerInput, _ctx: &mut MaterializeContext) -> Result<Expansion> {
        let target = match input.vars.get("stow_target_dir") {
            Some(Value::String(dir)) => absolute(dir),
            Some(other) => {
                return Err(Error::config("expected a path", "stow_target_dir", other));
            }
            None => return Err(Error::Bug("no default for 'stow_target_dir'".to_string())),
        };

        let role = RoleSpec {
            name: STOW_ROLE.to_string(),
            src: Some(STOW_ROLE_SRC.to_string()),
            tasks: Vec::new(),
        };
        let mut items = Vec::new();
        for repo in dotfiles::sources(&input.vars, &[DEFAULT_MARKER, "dotfiles"])? {
            for source in repo.app_dirs() {
                for app in dotfiles::applications(&source)? {
                    items.push(json!({
                        "desc": "stowing dotfiles",
                        "item_name": app,
                        "unique_task_id": format!("stow:{}/{app}", source.display()),
                        "vars": {
                            "name": app,
                            "stow_source_dir": source.display().to_string(),
                            "stow_target_dir": target.display().to_string(),
                        },
                        "role": role,
                    }));
                }
            }
        }

        if !items.is_empty() {
            let mut install = package_item("stow", AUTO, "present", None);
            install[keys::PRIORITY] = Value::from(priority(input) - 1);
            items.insert(0, install);
        }
        Ok(Expansion::new(items))
    }
}

/// Priority of the leaf's own tasks.
fn priority(input: &HandlerInput) -> i64 {
    input
        .meta
        .get(keys::PRIORITY)
        .and_then(Value::as_i64)
        .unwrap_or(DEFAULT_PRIORITY + input.index as i64 * PRIORITY_STEP)
}
