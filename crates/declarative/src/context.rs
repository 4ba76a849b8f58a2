//! Materialization context and provider traits
//!
//! These traits allow the declarative crate to be used without
//! depending on a specific execution engine or terminal UI.

use crate::types::{EngineKind, ExecutionEvent, Run, RunReport, TaskDescriptor, TaskVerdict};
use std::collections::HashSet;

/// State shared by all handlers during one materialization pass.
#[derive(Debug, Default)]
pub struct MaterializeContext {
    role_counter: usize,
    seen: HashSet<String>,
}

impl MaterializeContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name for the next synthesized role, unique within this pass.
    pub fn next_role_name(&mut self) -> String {
        self.role_counter += 1;
        format!("custom_role_{}", self.role_counter)
    }

    /// Record a dedup key; returns `false` if it was already taken.
    pub fn claim(&mut self, unique_task_id: &str) -> bool {
        self.seen.insert(unique_task_id.to_string())
    }
}

/// Executes one run and streams its event lines.
///
/// Implementations block until the engine is done; every line of engine
/// output is handed to `on_line` as soon as it is read.
pub trait ExecutionEngine {
    /// Engine kind this implementation executes.
    fn kind(&self) -> EngineKind;

    /// Execute a run, returning whether the engine exited successfully.
    fn execute(&mut self, run: &Run, on_line: &mut dyn FnMut(&str)) -> anyhow::Result<bool>;
}

/// Progress callback for run execution
///
/// Implement this trait to receive progress updates during execution.
pub trait RunObserver {
    /// Called before a run is handed to the engine
    fn on_run_start(&mut self, run: &Run);

    /// Called when the first event of a task arrives
    fn on_task_start(&mut self, task: &TaskDescriptor, total: usize);

    /// Called for every further event of the current task
    fn on_event(&mut self, _task: &TaskDescriptor, _event: &ExecutionEvent) {}

    /// Called when a task's verdict is known
    fn on_task_complete(&mut self, task: &TaskDescriptor, verdict: &TaskVerdict);

    /// Called after the engine is done with a run
    fn on_run_complete(&mut self, run: &Run, report: &RunReport);
}

/// No-op observer
pub struct NoProgress;

impl RunObserver for NoProgress {
    fn on_run_start(&mut self, _run: &Run) {}
    fn on_task_start(&mut self, _task: &TaskDescriptor, _total: usize) {}
    fn on_task_complete(&mut self, _task: &TaskDescriptor, _verdict: &TaskVerdict) {}
    fn on_run_complete(&mut self, _run: &Run, _report: &RunReport) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_names_are_unique() {
        let mut ctx = MaterializeContext::new();
        assert_eq!(ctx.next_role_name(), "custom_role_1");
        assert_eq!(ctx.next_role_name(), "custom_role_2");
    }

    #[test]
    fn test_claim() {
        let mut ctx = MaterializeContext::new();
        assert!(ctx.claim("install-git"));
        assert!(!ctx.claim("install-git"));
        assert!(ctx.claim("install-vim"));
    }
}
