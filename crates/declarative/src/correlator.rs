//! Execution correlator - folds an engine event stream into task verdicts

use crate::context::RunObserver;
use crate::types::{
    EventState, ExecutionEvent, Run, RunReport, TaskVerdict, VerdictState, output_text,
};
use std::collections::BTreeMap;

/// Consumes the event stream of one run.
///
/// Events arrive grouped by task. When the task id changes, the previous
/// task's events are reduced into a verdict and reported.
pub struct Correlator<'a, O: RunObserver + ?Sized> {
    run: &'a Run,
    observer: &'a mut O,
    current: Option<usize>,
    events: BTreeMap<usize, Vec<ExecutionEvent>>,
    verdicts: BTreeMap<usize, TaskVerdict>,
}

impl<'a, O: RunObserver + ?Sized> Correlator<'a, O> {
    pub fn new(run: &'a Run, observer: &'a mut O) -> Self {
        Self {
            run,
            observer,
            current: None,
            events: BTreeMap::new(),
            verdicts: BTreeMap::new(),
        }
    }

    /// Feed one raw line of engine output.
    pub fn feed_line(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        match ExecutionEvent::parse(line) {
            Ok(event) => self.feed(event),
            Err(e) if line.starts_with('{') => {
                log::warn!("Ignoring malformed engine event ({e}): {line}");
            }
            Err(_) => log::debug!("Engine: {line}"),
        }
    }

    /// Feed one parsed event.
    pub fn feed(&mut self, event: ExecutionEvent) {
        let run = self.run;
        let id = event.task_id;
        let Some(task) = run.task(id) else {
            log::debug!("No task associated to reported id {id}: {}", event.summary());
            return;
        };

        if self.current != Some(id) {
            if let Some(previous) = self.current {
                self.flush(previous);
            }
            self.current = Some(id);
            self.observer.on_task_start(task, run.len());
        }
        self.observer.on_event(task, &event);
        self.events.entry(id).or_default().push(event);
    }

    fn flush(&mut self, id: usize) {
        let Some(events) = self.events.get(&id) else {
            return;
        };
        let verdict = reduce(id, events);
        log::debug!("Result of task {id}: {}", verdict.state);
        if let Some(task) = self.run.task(id) {
            self.observer.on_task_complete(task, &verdict);
        }
        self.verdicts.insert(id, verdict);
    }

    /// Flush the last task and build the run report.
    pub fn finish(mut self, engine_success: bool) -> RunReport {
        if let Some(id) = self.current.take() {
            self.flush(id);
        }
        RunReport {
            index: self.run.index,
            verdicts: self.verdicts.into_values().collect(),
            engine_success,
        }
    }
}

/// Reduce all events of one task into a verdict.
///
/// Skipped if every event was skipped; failed if any event failed or the
/// host was unreachable; changed if any counted event changed something.
pub fn reduce(task_id: usize, events: &[ExecutionEvent]) -> TaskVerdict {
    let mut skipped = true;
    let mut failed = false;
    let mut changed = false;
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let mut msg = Vec::new();

    for event in events {
        if event.state == EventState::Skipped {
            continue;
        }
        skipped = false;

        if event.state.is_failure() {
            failed = true;
        }
        if event.is_ignored() {
            log::debug!("Ignoring changes reported by: {}", event.summary());
        } else if event.result.changed {
            changed = true;
        }
        stdout.extend(output_text(event.result.stdout.as_ref()));
        stderr.extend(output_text(event.result.stderr.as_ref()));
        msg.extend(output_text(event.result.msg.as_ref()));
    }

    let state = if skipped {
        VerdictState::Skipped
    } else if failed {
        stderr.append(&mut msg);
        VerdictState::Failed
    } else {
        msg.append(&mut stdout);
        stdout = msg;
        if changed {
            VerdictState::Changed
        } else {
            VerdictState::NoChange
        }
    };

    TaskVerdict {
        task_id,
        state,
        changed,
        stdout,
        stderr,
    }
}
