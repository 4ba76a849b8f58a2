//! Terminal progress for run execution

use crate::ui;
use colored::Colorize;
use declarative::{
    ExecutionEvent, Run, RunObserver, RunReport, TaskDescriptor, TaskVerdict, VerdictState,
};

/// Longest output line shown without `--details`.
const MAX_LINE: usize = 120;

/// Prints run headers, task titles and verdicts as they happen.
pub struct TerminalProgress {
    details: bool,
}

impl TerminalProgress {
    pub fn new(details: bool) -> Self {
        Self { details }
    }
}

impl RunObserver for TerminalProgress {
    fn on_run_start(&mut self, run: &Run) {
        ui::section(&format!("Run #{}", run.index));
    }

    fn on_task_start(&mut self, task: &TaskDescriptor, total: usize) {
        println!("{}", task.title(total).bold());
    }

    fn on_event(&mut self, _task: &TaskDescriptor, event: &ExecutionEvent) {
        if self.details {
            ui::dim(&event.summary());
        }
    }

    fn on_task_complete(&mut self, _task: &TaskDescriptor, verdict: &TaskVerdict) {
        println!("     => {}", colored_state(verdict.state));

        let limit = if self.details { usize::MAX } else { MAX_LINE };
        for line in &verdict.stderr {
            println!("        {}", ui::truncate(line, limit).red());
        }
        if self.details || verdict.is_failure() {
            for line in &verdict.stdout {
                ui::dim(&format!("      {}", ui::truncate(line, limit)));
            }
        }
    }

    fn on_run_complete(&mut self, run: &Run, report: &RunReport) {
        let counts = summarize(report);
        if report.is_success() {
            ui::success(&format!("Run #{} finished: {counts}", run.index));
        } else if report.verdicts.iter().any(TaskVerdict::is_failure) {
            ui::error(&format!("Run #{} failed: {counts}", run.index));
        } else {
            ui::error(&format!(
                "Run #{} failed: the engine exited with an error ({counts})",
                run.index
            ));
        }
    }
}

fn colored_state(state: VerdictState) -> colored::ColoredString {
    let text = state.to_string();
    match state {
        VerdictState::Failed => text.red().bold(),
        VerdictState::Changed => text.yellow(),
        VerdictState::NoChange => text.green(),
        VerdictState::Skipped => text.dimmed(),
    }
}

/// Count line such as `2 changed, 1 no change`.
pub fn summarize(report: &RunReport) -> String {
    let parts: Vec<String> = [
        VerdictState::Changed,
        VerdictState::NoChange,
        VerdictState::Skipped,
        VerdictState::Failed,
    ]
    .into_iter()
    .filter_map(|state| match report.count(state) {
        0 => None,
        n => Some(format!("{n} {state}")),
    })
    .collect();

    if parts.is_empty() {
        "no tasks reported".to_string()
    } else {
        parts.join(", ")
    }
}
