//! Print the vars a leaf resolves to

use crate::ui;
use declarative::{Expansion, Handler, HandlerInput, MaterializeContext, Result};
use serde_json::Value;

/// Shows the merged vars of its leaf and creates no tasks.
pub struct DebugVars;

impl Handler for DebugVars {
    fn name(&self) -> &str {
        "debug_vars"
    }

    fn expand(&self, input: &HandlerInput, _ctx: &mut MaterializeContext) -> Result<Expansion> {
        let vars = Value::Object(input.vars.clone());
        log::debug!("Vars of config item {}: {vars}", input.index);

        ui::section(&format!("Vars of config item {}", input.index));
        match serde_yaml::to_string(&vars) {
            Ok(yaml) => print!("{yaml}"),
            Err(_) => println!("{vars:#}"),
        }
        Ok(Expansion::none())
    }
}

#[cfg(test)]
mod tests {
    use crate::handlers::testing::materialize;
    use serde_json::json;

    #[test]
    fn test_no_tasks() {
        let out = materialize(vec![
            json!({"meta": {"name": "debug_vars"}, "vars": {"a": 1}}),
            json!({"meta": {"name": "folders"}, "vars": {"folders": "/srv/a"}}),
        ])
        .unwrap();

        assert_eq!(out.runs.len(), 1);
        assert_eq!(out.task_count(), 1);
        assert_eq!(out.runs[0].tasks[0].leaf_index, 1);
    }
}
