//! Git checkouts: dotfile repositories and arbitrary repos

use super::dotfiles::{self, DEFAULT_DOTFILES_DIR};
use super::{absolute, flag};
use declarative::{Error, Expansion, Handler, HandlerInput, MaterializeContext, Result, RoleSpec};
use serde_json::{Map, Value, json};
use std::collections::HashSet;

/// Checks out a git repository; shared by every checkout task.
fn git_role() -> RoleSpec {
    RoleSpec {
        name: "git-repo".to_string(),
        src: None,
        tasks: vec![json!({
            "name": "checkout {{ repo }}",
            "git": {
                "repo": "{{ repo }}",
                "dest": "{{ dest }}",
                "version": "{{ version | default(omit) }}",
                "update": "{{ update | default(omit) }}",
            },
        })],
    }
}

/// Task item checking `repo` out to `dest`.
///
/// Checkouts are unique per destination.
pub fn git_item(repo: &str, dest: &str) -> Value {
    let dest = absolute(dest).display().to_string();
    json!({
        "desc": "checking out git repo",
        "item_name": repo,
        "sudo": false,
        "unique_task_id": format!("git:{dest}"),
        "vars": {"repo": repo, "dest": dest},
        "role": git_role(),
    })
}

/// Clones dotfile repositories that have a remote.
///
/// ```yaml
/// - checkout-dotfiles:
///     dotfiles:
///       - https://github.com/me/dotfiles.git
///       - remote: git@github.com:me/work-dotfiles.git
///         base_dir: ~/work/dotfiles
/// ```
pub struct CheckoutDotfiles;

impl Handler for CheckoutDotfiles {
    fn name(&self) -> &str {
        "checkout-dotfiles"
    }

    fn defaults(&self) -> Map<String, Value> {
        let mut defaults = Map::new();
        defaults.insert("dotfiles".to_string(), Value::from(DEFAULT_DOTFILES_DIR));
        defaults.insert("update".to_string(), Value::Bool(false));
        defaults
    }

    fn expand(&self, input: &HandlerInput, _ctx: &mut MaterializeContext) -> Result<Expansion> {
        let update = flag(&input.vars, "update")?.unwrap_or(false);
        let mut used = HashSet::new();
        let mut items = Vec::new();
        for repo in dotfiles::sources(&input.vars, &[super::DEFAULT_MARKER, "dotfiles"])? {
            let base_dir = repo.base_dir.display().to_string();
            if !used.insert(base_dir.clone()) {
                return Err(Error::config(
                    format!("Dotfile directory '{base_dir}' is used more than once"),
                    "base_dir",
                    &base_dir,
                ));
            }
            let Some(remote) = repo.remote else {
                log::debug!("No remote for {base_dir}, nothing to check out");
                continue;
            };

            let mut item = git_item(&remote, &base_dir);
            item["desc"] = Value::from("checking out dotfiles");
            item["item_name"] = Value::from(format!("{remote} => {base_dir}"));
            item["vars"]["update"] = Value::Bool(update);
            items.push(item);
        }
        Ok(Expansion::new(items))
    }
}

/// Checks out one or more git repositories.
///
/// ```yaml
/// - git-repo:
///     repo: https://github.com/junegunn/fzf.git
///     dest: ~/.fzf
/// ```
pub struct GitRepo;

impl Handler for GitRepo {
    fn name(&self) -> &str {
        "git-repo"
    }

    fn expand(&self, input: &HandlerInput, _ctx: &mut MaterializeContext) -> Result<Expansion> {
        let repos: Vec<Map<String, Value>> = match input.vars.get("repos") {
            Some(Value::Array(entries)) => entries
                .iter()
                .map(|entry| match entry {
                    Value::Object(map) => Ok(map.clone()),
                    other => Err(Error::config("expected a mapping with 'repo' and 'dest'", "repos", other)),
                })
                .collect::<Result<_>>()?,
            Some(other) => return Err(Error::config("expected a list of repositories", "repos", other)),
            None => vec![input.vars.clone()],
        };

        let mut items = Vec::new();
        for repo in &repos {
            let field = |key: &str| match repo.get(key) {
                Some(Value::String(s)) => Ok(s.as_str()),
                other => Err(Error::config(
                    format!("git-repo needs a '{key}'"),
                    key,
                    other.cloned().unwrap_or(Value::Null),
                )),
            };
            let mut item = git_item(field("repo")?, field("dest")?);
            for key in ["version", "update"] {
                if let Some(value) = repo.get(key) {
                    item["vars"][key] = value.clone();
                }
            }
            items.push(item);
        }
        Ok(Expansion::new(items))
    }
}
