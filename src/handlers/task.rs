//! Ad-hoc tasks: any engine module, run through a generated role

use super::{DEFAULT_MARKER, flag};
use declarative::{
    Error, Expansion, Handler, HandlerInput, MaterializeContext, Result, RoleSpec, keys,
};
use serde_json::{Map, Value};

/// Key naming the module when the task is written as `task`.
const MODULE_KEY: &str = "module";

/// Runs the task name as an engine module, with the vars as its arguments.
///
/// ```yaml
/// - shell: "echo hello > /tmp/hello"
/// - apt:
///     name: nginx
///     update_cache: true
/// ```
///
/// Accepts every leaf, so it must be registered last.
pub struct AdHocTask;

impl Handler for AdHocTask {
    fn name(&self) -> &str {
        "task"
    }

    fn can_handle(&self, _meta: &Map<String, Value>) -> bool {
        true
    }

    fn expand(&self, input: &HandlerInput, ctx: &mut MaterializeContext) -> Result<Expansion> {
        let mut args = input.vars.clone();
        let module = match input.meta.get(keys::NAME).and_then(Value::as_str) {
            Some(name) if name != self.name() => name.to_string(),
            _ => match args.remove(MODULE_KEY) {
                Some(Value::String(module)) => module,
                other => {
                    return Err(Error::config(
                        "task needs a module name",
                        MODULE_KEY,
                        other.unwrap_or(Value::Null),
                    ));
                }
            },
        };
        let sudo = flag(&input.meta, keys::SUDO)?.unwrap_or(false);
        let desc = input
            .meta
            .get(keys::DESC)
            .and_then(Value::as_str)
            .unwrap_or("executing");

        let free_form = args.remove(DEFAULT_MARKER);
        let mut step = Map::new();
        step.insert("name".to_string(), Value::from(format!("{desc} {module}")));
        match free_form {
            Some(value) if !value.is_object() => {
                step.insert(module.clone(), value);
                if !args.is_empty() {
                    step.insert("args".to_string(), Value::Object(args.clone()));
                }
            }
            Some(Value::Object(extra)) => {
                args.extend(extra);
                step.insert(module.clone(), Value::Object(args.clone()));
            }
            _ => {
                step.insert(module.clone(), Value::Object(args.clone()));
            }
        }
        step.insert("become".to_string(), Value::Bool(sudo));

        let role = RoleSpec {
            name: ctx.next_role_name(),
            src: None,
            tasks: vec![Value::Object(step)],
        };

        let mut item = Map::new();
        item.insert(
            keys::ROLE.to_string(),
            serde_json::to_value(role).map_err(|e| Error::Bug(e.to_string()))?,
        );
        item.insert(keys::VARS.to_string(), Value::Object(args));
        if !input.meta.contains_key(keys::DESC) {
            item.insert(keys::DESC.to_string(), Value::from(desc));
        }
        if !input.meta.contains_key(keys::ITEM_NAME) {
            item.insert(keys::ITEM_NAME.to_string(), Value::from(module));
        }
        Ok(Expansion::single(Value::Object(item)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::testing::materialize;
    use serde_json::json;

    #[test]
    fn test_free_form_module() {
        let out = materialize(vec![json!({
            "meta": {"name": "shell"},
            "vars": {"frkl_default": "echo hi", "chdir": "/tmp"},
        })])
        .unwrap();

        let task = &out.runs[0].tasks[0];
        assert_eq!(task.handler, "task");
        assert_eq!(task.item_name, "shell");
        assert_eq!(task.description, "executing");
        let role = task.resolve_role().unwrap();
        assert_eq!(role.name, "custom_role_1");
        assert_eq!(
            role.tasks[0],
            json!({
                "name": "executing shell",
                "shell": "echo hi",
                "args": {"chdir": "/tmp"},
                "become": false,
            })
        );
    }

    #[test]
    fn test_module_with_arguments() {
        let out = materialize(vec![json!({
            "meta": {"name": "apt", "sudo": true, "desc": "nginx"},
            "vars": {"name": "nginx", "update_cache": true},
        })])
        .unwrap();

        let task = &out.runs[0].tasks[0];
        assert!(task.sudo);
        assert_eq!(task.description, "nginx");
        let step = &task.resolve_role().unwrap().tasks[0];
        assert_eq!(step["apt"], json!({"name": "nginx", "update_cache": true}));
        assert_eq!(step["become"], true);
    }

    #[test]
    fn test_generated_roles_are_numbered() {
        let out = materialize(vec![
            json!({"meta": {"name": "command"}, "vars": {"frkl_default": "true"}}),
            json!({"meta": {"name": "command"}, "vars": {"frkl_default": "false"}}),
        ])
        .unwrap();

        let names: Vec<_> = out.runs[0]
            .tasks
            .iter()
            .map(|t| t.resolve_role().unwrap().name)
            .collect();
        assert_eq!(names, vec!["custom_role_1", "custom_role_2"]);
    }

    #[test]
    fn test_explicit_task_needs_module() {
        let out = materialize(vec![json!({
            "meta": {"name": "task"},
            "vars": {"module": "ping"},
        })])
        .unwrap();
        assert!(out.runs[0].tasks[0].resolve_role().unwrap().tasks[0].get("ping").is_some());

        let err = materialize(vec![json!({"meta": {"name": "task"}})]).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }
}
