//! Run driver - executes runs in order, stopping at the first failure

use crate::context::{ExecutionEngine, RunObserver};
use crate::correlator::Correlator;
use crate::error::{Error, Result};
use crate::types::{ExecuteSummary, Run, keys};

/// Execute runs sequentially with the given engine and observer
///
/// Empty runs are skipped. The first failed run ends the iteration; later
/// runs are counted in [`ExecuteSummary::aborted_runs`] but never started.
///
/// # Errors
/// Fails before starting anything if a run needs an engine other than
/// `engine`, and whenever the engine itself can't be driven.
pub fn execute<E, O>(runs: &[Run], engine: &mut E, observer: &mut O) -> Result<ExecuteSummary>
where
    E: ExecutionEngine + ?Sized,
    O: RunObserver + ?Sized,
{
    let kind = engine.kind();
    if let Some(run) = runs.iter().find(|r| !r.is_empty() && r.engine != kind) {
        return Err(Error::config(
            format!("Engine '{}' is not supported (run #{})", run.engine, run.index),
            keys::ENGINE,
            &run.engine,
        ));
    }

    let mut summary = ExecuteSummary::default();

    for (pos, run) in runs.iter().enumerate() {
        if run.is_empty() {
            log::debug!("Run #{} has nothing to do, skipping", run.index);
            summary.empty_runs += 1;
            continue;
        }

        observer.on_run_start(run);
        let mut correlator = Correlator::new(run, observer);
        let engine_success = engine.execute(run, &mut |line: &str| correlator.feed_line(line))?;
        let report = correlator.finish(engine_success);
        observer.on_run_complete(run, &report);

        let success = report.is_success();
        summary.runs.push(report);
        if !success {
            summary.aborted_runs = runs[pos + 1..].iter().filter(|r| !r.is_empty()).count();
            log::info!(
                "Run #{} failed, not starting {} remaining run(s)",
                run.index,
                summary.aborted_runs
            );
            break;
        }
    }

    Ok(summary)
}

/// Execute runs without progress reporting.
pub fn execute_simple<E: ExecutionEngine + ?Sized>(
    runs: &[Run],
    engine: &mut E,
) -> Result<ExecuteSummary> {
    use crate::context::NoProgress;

    execute(runs, engine, &mut NoProgress)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::NoProgress;
    use crate::types::{EngineKind, TaskDescriptor, VerdictState};
    use serde_json::Map;

    /// Replays canned output, one script per run index.
    struct Scripted {
        scripts: Vec<(Vec<&'static str>, bool)>,
        executed: Vec<usize>,
    }

    impl ExecutionEngine for Scripted {
        fn kind(&self) -> EngineKind {
            EngineKind::ansible()
        }

        fn execute(&mut self, run: &Run, on_line: &mut dyn FnMut(&str)) -> anyhow::Result<bool> {
            self.executed.push(run.index);
            let (lines, exit_ok) = self
                .scripts
                .get(run.index - 1)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("no script for run {}", run.index))?;
            for line in lines {
                on_line(line);
            }
            Ok(exit_ok)
        }
    }

    fn run(index: usize, tasks: usize, engine: &str) -> Run {
        let tasks = (1..=tasks)
            .map(|id| TaskDescriptor {
                id,
                handler: "task".into(),
                task_type: "shell".into(),
                description: "step".into(),
                item_name: format!("r{index}t{id}"),
                vars: Map::new(),
                sudo: false,
                priority: 10_000,
                unique_task_id: None,
                new_run_after_this: false,
                role: None,
                roles: Default::default(),
                leaf_index: 0,
                engine: EngineKind(engine.into()),
            })
            .collect();
        Run {
            index,
            engine: EngineKind(engine.into()),
            tasks,
        }
    }

    const OK: &str = r#"{"task_id": 1, "state": "ok", "result": {"changed": true}}"#;
    const FAILED: &str = r#"{"task_id": 1, "state": "failed", "result": {"msg": "nope"}}"#;

    #[test]
    fn test_fail_fast() {
        let runs = vec![run(1, 1, "ansible"), run(2, 1, "ansible"), run(3, 1, "ansible")];
        let mut engine = Scripted {
            scripts: vec![(vec![OK], true), (vec![FAILED], true), (vec![OK], true)],
            executed: Vec::new(),
        };

        let summary = execute(&runs, &mut engine, &mut NoProgress).unwrap();
        assert_eq!(engine.executed, vec![1, 2]);
        assert!(!summary.is_success());
        assert_eq!(summary.failed_run(), Some(2));
        assert_eq!(summary.aborted_runs, 1);
        assert_eq!(summary.count(VerdictState::Changed), 1);
        assert_eq!(summary.count(VerdictState::Failed), 1);
    }

    #[test]
    fn test_empty_runs_skipped() {
        let runs = vec![run(1, 1, "ansible"), run(2, 0, "ansible")];
        let mut engine = Scripted {
            scripts: vec![(vec![OK], true)],
            executed: Vec::new(),
        };

        let summary = execute_simple(&runs, &mut engine).unwrap();
        assert!(summary.is_success());
        assert_eq!(engine.executed, vec![1]);
        assert_eq!(summary.empty_runs, 1);
    }

    #[test]
    fn test_engine_exit_status_fails_run() {
        let runs = vec![run(1, 1, "ansible"), run(2, 1, "ansible")];
        let mut engine = Scripted {
            scripts: vec![(vec![OK], false), (vec![OK], true)],
            executed: Vec::new(),
        };

        let summary = execute_simple(&runs, &mut engine).unwrap();
        assert_eq!(engine.executed, vec![1]);
        assert!(!summary.is_success());
    }

    #[test]
    fn test_unsupported_engine_rejected_up_front() {
        let runs = vec![run(1, 1, "ansible"), run(2, 1, "shell")];
        let mut engine = Scripted {
            scripts: vec![(vec![OK], true), (vec![OK], true)],
            executed: Vec::new(),
        };

        let err = execute_simple(&runs, &mut engine).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
        assert!(engine.executed.is_empty());
    }

    #[test]
    fn test_engine_error_propagates() {
        let runs = vec![run(1, 1, "ansible")];
        let mut engine = Scripted {
            scripts: Vec::new(),
            executed: Vec::new(),
        };

        let err = execute_simple(&runs, &mut engine).unwrap_err();
        assert!(matches!(err, Error::Engine(_)));
    }
}
