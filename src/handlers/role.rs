//! Applying a named role

use declarative::{Expansion, Handler, HandlerInput, MaterializeContext, Result, keys};
use serde_json::{Map, Value};

/// Runs a role listed in the leaf's `roles` map.
///
/// The role is the one named by `role`, or else the one named like the task.
/// Other entries of `roles` are fetched alongside it.
///
/// ```yaml
/// - meta:
///     name: ansible-nginx
///     roles:
///       ansible-nginx: https://github.com/example/ansible-nginx
/// ```
pub struct ApplyRole;

impl Handler for ApplyRole {
    fn name(&self) -> &str {
        "role"
    }

    fn can_handle(&self, meta: &Map<String, Value>) -> bool {
        selected_role(meta).is_some()
    }

    fn expand(&self, input: &HandlerInput, _ctx: &mut MaterializeContext) -> Result<Expansion> {
        let meta = &input.meta;
        let Some(name) = selected_role(meta) else {
            return Ok(Expansion::none());
        };

        let mut item = Map::new();
        item.insert(keys::ROLE.to_string(), Value::from(name));
        let defaults = [
            (keys::DESC, Value::from("applying role")),
            (keys::ITEM_NAME, Value::from(name)),
            (keys::SUDO, Value::Bool(true)),
        ];
        for (key, value) in defaults {
            if !meta.contains_key(key) {
                item.insert(key.to_string(), value);
            }
        }
        Ok(Expansion::single(Value::Object(item)))
    }
}

/// Name of the role to run, if it is listed in `roles`.
fn selected_role(meta: &Map<String, Value>) -> Option<&str> {
    let roles = meta.get(keys::ROLES)?.as_object()?;
    let name = match meta.get(keys::ROLE) {
        Some(Value::String(role)) => role.as_str(),
        _ => meta.get(keys::NAME)?.as_str()?,
    };
    roles.contains_key(name).then_some(name)
}
