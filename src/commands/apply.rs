use crate::Context;
use crate::engine::ProcessEngine;
use crate::handlers;
use crate::progress::TerminalProgress;
use crate::ui;
use anyhow::Result;
use declarative::{ExecuteSummary, Materializer, VerdictState};

/// Resolve, materialize and execute sources.
pub fn run(ctx: &Context, sources: &[String], details: bool) -> Result<()> {
    let mut leaves = super::resolve(&ctx.config, sources)?;

    let registry = handlers::registry();
    let materialized = Materializer::new(&registry)
        .with_defaults(ctx.config.defaults.clone())
        .materialize(&mut leaves)?;

    if materialized.task_count() == 0 {
        ui::warn("Nothing to do");
        return Ok(());
    }
    if !ctx.quiet {
        let runs = materialized.runs.iter().filter(|r| !r.is_empty()).count();
        ui::info(&format!(
            "{} task(s) in {runs} run(s)",
            materialized.task_count()
        ));
    }

    let mut engine = ProcessEngine::new(&ctx.config)?;
    let mut progress = TerminalProgress::new(details);
    let summary = declarative::execute(&materialized.runs, &mut engine, &mut progress)?;

    if !ctx.quiet {
        print_summary(&summary);
    }

    match summary.failed_run() {
        Some(run) => Err(declarative::Error::RunFailed { run }.into()),
        None => Ok(()),
    }
}

fn print_summary(summary: &ExecuteSummary) {
    ui::header("Summary");
    ui::kv("tasks", &summary.total().to_string());
    for state in [
        VerdictState::Changed,
        VerdictState::NoChange,
        VerdictState::Skipped,
        VerdictState::Failed,
    ] {
        let count = summary.count(state);
        if count > 0 {
            ui::kv(&state.to_string(), &count.to_string());
        }
    }
    if summary.aborted_runs > 0 {
        ui::warn(&format!(
            "{} run(s) not started after the failure",
            summary.aborted_runs
        ));
    }
}
