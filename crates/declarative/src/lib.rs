//! # Declarative
//!
//! Turns resolved configuration leaves into ordered task runs, executes them
//! through an external engine and judges the outcome of every task.
//!
//! ## Core Concepts
//!
//! - **Handler**: expands one leaf into raw task descriptions
//! - **TaskDescriptor**: one concrete unit of work, with priority and role
//! - **Run**: a sorted batch of tasks the engine executes in one go
//! - **Correlator**: folds the engine's event stream into task verdicts
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{HandlerRegistry, Materializer, NoProgress, execute};
//!
//! let registry = HandlerRegistry::new().with(Install).with(Stow);
//! let materialized = Materializer::new(&registry).materialize(&mut leaves)?;
//! let summary = execute(&materialized.runs, &mut engine, &mut NoProgress)?;
//! if !summary.is_success() {
//!     eprintln!("run #{:?} failed", summary.failed_run());
//! }
//! ```
//!
//! ## Provider Traits
//!
//! - [`Handler`]: task type implementations
//! - [`ExecutionEngine`]: runs a batch of tasks and streams event lines
//! - [`RunObserver`]: receives progress updates
//!
//! This allows the crate to be used without hard dependencies on a
//! particular engine or terminal UI.

pub mod context;
pub mod correlator;
pub mod driver;
pub mod error;
pub mod handler;
pub mod materializer;
pub mod types;

// Re-export main types at crate root
pub use context::{ExecutionEngine, MaterializeContext, NoProgress, RunObserver};
pub use correlator::{Correlator, reduce};
pub use driver::{execute, execute_simple};
pub use error::{Error, ErrorCategory, Result};
pub use handler::{Expansion, Handler, HandlerInput, HandlerRegistry};
pub use materializer::{HandlerTrace, Materialized, Materializer};
pub use types::{
    EngineKind, EventResult, EventState, ExecuteSummary, ExecutionEvent, RoleRef, RoleSpec, Run,
    RunReport, TaskDescriptor, TaskVerdict, VerdictState, fetchable_source, keys,
};
