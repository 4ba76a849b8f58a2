//! Run materializer - turns bound leaves into ordered runs

use crate::context::MaterializeContext;
use crate::error::{Error, Result};
use crate::handler::{Expansion, HandlerInput, HandlerRegistry};
use crate::types::{DEFAULT_PRIORITY, EngineKind, PRIORITY_STEP, Run, TaskDescriptor, keys};
use frkl::{Leaf, merge_maps};
use serde::Serialize;
use serde_json::{Map, Value};

/// One recorded handler expansion, for debugging handlers.
#[derive(Debug, Clone, Serialize)]
pub struct HandlerTrace {
    pub handler: String,
    pub input: HandlerInput,
    pub output: Expansion,
}

/// Output of a materialization pass.
#[derive(Debug, Clone, Default)]
pub struct Materialized {
    /// Runs in execution order; the last one may be empty.
    pub runs: Vec<Run>,
    /// Expansions of the traced handler.
    pub traces: Vec<HandlerTrace>,
}

impl Materialized {
    /// Total number of tasks over all runs.
    pub fn task_count(&self) -> usize {
        self.runs.iter().map(Run::len).sum()
    }
}

/// Expands leaves into runs using a handler registry.
pub struct Materializer<'r> {
    registry: &'r HandlerRegistry,
    defaults: Map<String, Value>,
    trace: Option<String>,
}

impl<'r> Materializer<'r> {
    pub fn new(registry: &'r HandlerRegistry) -> Self {
        Self {
            registry,
            defaults: Map::new(),
            trace: None,
        }
    }

    /// Global vars every handler input starts from.
    pub fn with_defaults(mut self, defaults: Map<String, Value>) -> Self {
        self.defaults = defaults;
        self
    }

    /// Record every expansion done by the named handler.
    pub fn trace(mut self, handler: impl Into<String>) -> Self {
        self.trace = Some(handler.into());
        self
    }

    /// Bind, expand, deduplicate and partition leaves into runs.
    pub fn materialize(&self, leaves: &mut [Leaf]) -> Result<Materialized> {
        self.registry.bind_all(leaves)?;

        let mut ctx = MaterializeContext::new();
        let mut out = Materialized::default();
        let mut pending = Pending::default();

        for (index, leaf) in leaves.iter().enumerate() {
            let Some(meta) = leaf.aspect_map(keys::META) else {
                log::debug!("Skipping leaf {index}: no meta");
                continue;
            };
            let handler = self.registry.bind(meta)?;

            let leaf_vars = leaf
                .aspect_map(keys::VARS)
                .cloned()
                .unwrap_or_default();
            let input = HandlerInput {
                meta: meta.clone(),
                vars: merge_maps(&merge_maps(&self.defaults, &handler.defaults()), &leaf_vars),
                index,
            };

            let expansion = handler.expand(&input, &mut ctx)?;
            if self.trace.as_deref() == Some(handler.name()) {
                out.traces.push(HandlerTrace {
                    handler: handler.name().to_string(),
                    input: input.clone(),
                    output: expansion.clone(),
                });
            }
            if expansion.items.is_empty() {
                log::debug!("No tasks created for '{}' (leaf {index})", handler.name());
                continue;
            }

            for item in expansion.items {
                let task = describe(&input, handler.name(), &expansion.engine, item)?;

                if let Some(key) = &task.unique_task_id
                    && !ctx.claim(key)
                {
                    log::debug!("Already got a task with id '{key}', ignoring this one");
                    continue;
                }

                let close = task.new_run_after_this;
                pending.push(task)?;
                if close {
                    out.runs.push(pending.flush(out.runs.len() + 1));
                }
            }
        }

        out.runs.push(pending.flush(out.runs.len() + 1));
        Ok(out)
    }
}

/// Merge a raw item onto the leaf's meta and fill in defaults.
fn describe(
    input: &HandlerInput,
    handler: &str,
    engine: &EngineKind,
    item: Value,
) -> Result<TaskDescriptor> {
    let Value::Object(raw) = item else {
        return Err(Error::Bug(format!(
            "handler '{handler}' returned a non-mapping task: {item}"
        )));
    };

    let mut merged = merge_maps(&input.meta, &raw);
    let index = input.index;
    let defaults = [
        (keys::NAME, Value::from(handler)),
        (keys::DESC, Value::from(format!("config item {index}: {handler}"))),
        (keys::ITEM_NAME, Value::from(format!("{handler}_{index}"))),
        (
            keys::PRIORITY,
            Value::from(DEFAULT_PRIORITY + index as i64 * PRIORITY_STEP),
        ),
        (keys::SUDO, Value::Bool(false)),
        (keys::NEW_RUN_AFTER_THIS, Value::Bool(false)),
        (keys::VARS, Value::Object(input.vars.clone())),
    ];
    for (key, value) in defaults {
        merged.entry(key).or_insert(value);
    }
    merged.insert(keys::HANDLER.to_string(), Value::from(handler));
    merged.insert(keys::LEAF_INDEX.to_string(), Value::from(index));
    merged.insert(keys::ENGINE.to_string(), Value::from(engine.as_str()));

    let shown = Value::Object(merged.clone());
    serde_json::from_value(Value::Object(merged)).map_err(|e| {
        Error::config(format!("invalid task description: {e}"), handler, shown)
    })
}

/// Tasks waiting for the next run boundary.
#[derive(Default)]
struct Pending {
    tasks: Vec<TaskDescriptor>,
}

impl Pending {
    fn push(&mut self, task: TaskDescriptor) -> Result<()> {
        if let Some(first) = self.tasks.first()
            && first.engine != task.engine
        {
            return Err(Error::config(
                format!(
                    "Can't use multiple engines in the same run: {} and {}",
                    first.engine, task.engine
                ),
                keys::ENGINE,
                &task.engine,
            ));
        }
        self.tasks.push(task);
        Ok(())
    }

    fn flush(&mut self, index: usize) -> Run {
        let mut tasks = std::mem::take(&mut self.tasks);
        tasks.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| a.item_name.cmp(&b.item_name))
        });
        for (i, task) in tasks.iter_mut().enumerate() {
            task.id = i + 1;
        }
        let engine = tasks
            .first()
            .map(|t| t.engine.clone())
            .unwrap_or_default();
        log::debug!("Materialized run #{index} with {} task(s)", tasks.len());
        Run {
            index,
            engine,
            tasks,
        }
    }
}
