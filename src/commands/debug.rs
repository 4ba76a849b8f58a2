use crate::Context;
use crate::handlers;
use crate::ui;
use anyhow::{Context as _, Result};
use declarative::{HandlerTrace, Materializer, Run};
use serde_json::json;

/// Show a handler's inputs and outputs plus the runs, without executing.
pub fn run(ctx: &Context, handler: &str, sources: &[String]) -> Result<()> {
    let registry = handlers::registry();
    if registry.get(handler).is_none() {
        return Err(declarative::Error::config(
            format!(
                "No handler named '{handler}', available: {}",
                registry.names().join(", ")
            ),
            "handler",
            handler,
        )
        .into());
    }

    let mut leaves = super::resolve(&ctx.config, sources)?;
    let materialized = Materializer::new(&registry)
        .with_defaults(ctx.config.defaults.clone())
        .trace(handler)
        .materialize(&mut leaves)?;

    ui::header(&format!("Handler '{handler}'"));
    if materialized.traces.is_empty() {
        ui::dim("not used by any configuration item");
    }
    print!("{}", render_traces(&materialized.traces)?);

    ui::header("Runs");
    for run in materialized.runs.iter().filter(|r| !r.is_empty()) {
        print_run(run);
    }
    Ok(())
}

fn render_traces(traces: &[HandlerTrace]) -> Result<String> {
    let mut out = String::new();
    for trace in traces {
        out.push_str(&format!("# config item {}\n", trace.input.index));
        out.push_str(
            &serde_yaml::to_string(&json!({"input": trace.input, "output": trace.output}))
                .context("Could not serialize trace")?,
        );
    }
    Ok(out)
}

fn print_run(run: &Run) {
    ui::section(&format!("Run #{}", run.index));
    for task in &run.tasks {
        println!("{}", task.title(run.len()));
        let role = task
            .resolve_role()
            .map_or_else(|e| format!("<{e}>"), |role| role.name);
        ui::kv("role", &role);
        ui::kv("priority", &task.priority.to_string());
        if task.sudo {
            ui::kv("sudo", "yes");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FrecklesConfig;
    use crate::handlers::testing::materialize;

    #[test]
    fn test_render_traces() {
        let mut leaves = crate::commands::resolve(
            &FrecklesConfig::default(),
            &["frecks: [{folders: /srv/a}, {install: [git]}]".to_string()],
        )
        .unwrap();
        let registry = handlers::registry();
        let materialized = Materializer::new(&registry)
            .trace("folders")
            .materialize(&mut leaves)
            .unwrap();

        let out = render_traces(&materialized.traces).unwrap();
        assert!(out.starts_with("# config item 0\n"));
        assert!(out.contains("file_path: /srv/a"));
        assert!(!out.contains("pkg_name"));
    }

    #[test]
    fn test_no_traces_renders_nothing() {
        let out = materialize(vec![json!({
            "meta": {"name": "install"},
            "vars": {"packages": "git"},
        })])
        .unwrap();
        assert!(render_traces(&out.traces).unwrap().is_empty());
    }
}
