//! Folder creation and file removal

use super::{DEFAULT_MARKER, absolute, flag, string_list};
use declarative::{Expansion, Handler, HandlerInput, MaterializeContext, Result, RoleSpec};
use serde_json::{Value, json};

/// Ensures folders exist.
///
/// ```yaml
/// - folders: [~/projects, ~/.local/bin]
/// ```
pub struct Folders;

/// Removes files or folders.
pub struct Delete;

impl Handler for Folders {
    fn name(&self) -> &str {
        "folders"
    }

    fn expand(&self, input: &HandlerInput, _ctx: &mut MaterializeContext) -> Result<Expansion> {
        path_items(input, &["folders", DEFAULT_MARKER], &FOLDER)
    }
}

impl Handler for Delete {
    fn name(&self) -> &str {
        "delete"
    }

    fn expand(&self, input: &HandlerInput, _ctx: &mut MaterializeContext) -> Result<Expansion> {
        path_items(input, &["files", DEFAULT_MARKER], &ABSENT)
    }
}

/// How one path becomes a task.
struct PathAction {
    role: &'static str,
    desc: &'static str,
    state: &'static str,
    prefix: &'static str,
}

const FOLDER: PathAction = PathAction {
    role: "ensure-folder",
    desc: "ensure folder exists",
    state: "directory",
    prefix: "folder",
};

const ABSENT: PathAction = PathAction {
    role: "delete-file",
    desc: "delete file",
    state: "absent",
    prefix: "delete",
};

fn path_items(input: &HandlerInput, keys: &[&str], action: &PathAction) -> Result<Expansion> {
    let sudo = flag(&input.vars, "sudo")?.unwrap_or(false);
    let role = RoleSpec {
        name: action.role.to_string(),
        src: None,
        tasks: vec![json!({
            "name": format!("{} {{{{ file_path }}}}", action.desc),
            "file": {"path": "{{ file_path }}", "state": action.state},
        })],
    };

    let items = string_list(&input.vars, keys)?
        .iter()
        .map(|raw| {
            let path = absolute(raw).display().to_string();
            json!({
                "desc": action.desc,
                "item_name": path,
                "sudo": sudo,
                "unique_task_id": format!("{}:{path}", action.prefix),
                "vars": {"file_path": path},
                "role": role,
            })
        })
        .collect::<Vec<Value>>();
    Ok(Expansion::new(items))
}
