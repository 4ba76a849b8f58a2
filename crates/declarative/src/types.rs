//! Core types for materialized task runs

use crate::error::{Error, Result};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Base priority for tasks that don't declare one.
pub const DEFAULT_PRIORITY: i64 = 10_000;

/// Priority distance between consecutive leaves.
pub const PRIORITY_STEP: i64 = 1_000;

/// Engine events whose task name contains this marker never count as a change.
pub const IGNORE_MARKER: &str = "[freckles:ignore]";

/// Names of the aspects and meta keys the materializer understands.
pub mod keys {
    /// Aspect describing which handler to use and how.
    pub const META: &str = "meta";
    /// Aspect holding handler input.
    pub const VARS: &str = "vars";
    /// Task type name.
    pub const NAME: &str = "name";
    /// Cached handler binding.
    pub const HANDLER: &str = "handler";
    /// Human readable description.
    pub const DESC: &str = "desc";
    /// Display label.
    pub const ITEM_NAME: &str = "item_name";
    /// Sort priority.
    pub const PRIORITY: &str = "priority";
    /// Elevated privileges.
    pub const SUDO: &str = "sudo";
    /// Close the current run after this task.
    pub const NEW_RUN_AFTER_THIS: &str = "new_run_after_this";
    /// Deduplication key.
    pub const UNIQUE_TASK_ID: &str = "unique_task_id";
    /// Role bound to a task.
    pub const ROLE: &str = "role";
    /// Roles a task may use, by name.
    pub const ROLES: &str = "roles";
    /// Position of the originating leaf.
    pub const LEAF_INDEX: &str = "leaf_index";
    /// Engine kind.
    pub const ENGINE: &str = "engine";
}

/// Which execution engine a task is written for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EngineKind(pub String);

impl EngineKind {
    /// The Ansible engine.
    pub fn ansible() -> Self {
        Self("ansible".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EngineKind {
    fn default() -> Self {
        Self::ansible()
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A role (bundle of engine steps) a task runs through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleSpec {
    /// Role name.
    pub name: String,
    /// Where to install the role from, for external roles.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    /// Steps of a synthesized role; empty for external roles.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tasks: Vec<Value>,
}

impl RoleSpec {
    /// Whether the role is generated rather than installed.
    pub fn is_internal(&self) -> bool {
        !self.tasks.is_empty()
    }
}

/// Source prefix of roles that ship with freckles and are never fetched.
pub const BUNDLED_ROLE_PREFIX: &str = "frkl:";

/// Where to fetch a role from, if it has to be fetched at all.
///
/// Empty and bundled sources give `None`.
pub fn fetchable_source(src: &str) -> Option<&str> {
    Some(src).filter(|s| !s.is_empty() && !s.starts_with(BUNDLED_ROLE_PREFIX))
}

/// The `role` of a task: a name picked from its `roles`, or a full role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RoleRef {
    /// Name of the role to run, usually a key of `roles`.
    Name(String),
    /// A role given in full.
    Spec(RoleSpec),
}

impl From<RoleSpec> for RoleRef {
    fn from(role: RoleSpec) -> Self {
        Self::Spec(role)
    }
}

/// One concrete unit of work derived from a leaf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    /// Position within its run, starting at 1.
    #[serde(default)]
    pub id: usize,
    /// Handler that produced this task.
    pub handler: String,
    /// Task type name as written in the configuration.
    #[serde(rename = "name")]
    pub task_type: String,
    /// Human readable description.
    #[serde(rename = "desc")]
    pub description: String,
    /// Display label.
    pub item_name: String,
    /// Engine input.
    #[serde(default)]
    pub vars: Map<String, Value>,
    /// Run with elevated privileges.
    #[serde(default)]
    pub sudo: bool,
    /// Sort key, lower runs earlier.
    pub priority: i64,
    /// Tasks sharing this key are only run once.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_task_id: Option<String>,
    /// Close the current run after this task.
    #[serde(default)]
    pub new_run_after_this: bool,
    /// Role this task runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<RoleRef>,
    /// Candidate roles by name, mapped to their source.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub roles: BTreeMap<String, String>,
    /// Position of the leaf this task came from.
    pub leaf_index: usize,
    /// Engine this task is written for.
    #[serde(default)]
    pub engine: EngineKind,
}

impl TaskDescriptor {
    /// Title line shown when the task starts, e.g. `task 01/03: install 'git'`.
    pub fn title(&self, total: usize) -> String {
        format!(
            "task {:02}/{:02}: {} '{}'",
            self.id, total, self.description, self.item_name
        )
    }

    /// The single role this task runs.
    ///
    /// That is its `role`, looked up in `roles` when given by name, or the
    /// only entry of `roles`. Anything else means a handler produced an
    /// incomplete task.
    pub fn resolve_role(&self) -> Result<RoleSpec> {
        match &self.role {
            Some(RoleRef::Spec(role)) => return Ok(role.clone()),
            Some(RoleRef::Name(name)) => return Ok(self.named_role(name)),
            None => {}
        }
        let mut roles = self.roles.keys();
        match (roles.next(), roles.next()) {
            (Some(name), None) => Ok(self.named_role(name)),
            (None, _) => Err(Error::Bug(format!(
                "task '{}' has no role to run",
                self.item_name
            ))),
            (Some(_), Some(_)) => Err(Error::Bug(format!(
                "task '{}' has more than one role and none selected: {:?}",
                self.item_name,
                self.roles.keys().collect::<Vec<_>>()
            ))),
        }
    }

    /// A role by name; names missing from `roles` are expected to be installed.
    fn named_role(&self, name: &str) -> RoleSpec {
        RoleSpec {
            name: name.to_string(),
            src: self
                .roles
                .get(name)
                .and_then(|src| fetchable_source(src))
                .map(str::to_string),
            tasks: Vec::new(),
        }
    }

    /// Every entry of `roles` that has to be fetched, by name.
    pub fn fetchable_roles(&self) -> impl Iterator<Item = (&str, &str)> {
        self.roles
            .iter()
            .filter_map(|(name, src)| fetchable_source(src).map(|src| (name.as_str(), src)))
    }
}

/// An ordered batch of tasks executed together.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Run {
    /// One-based run index.
    pub index: usize,
    /// Engine all tasks are written for.
    pub engine: EngineKind,
    /// Tasks, sorted, with ids `1..=n`.
    pub tasks: Vec<TaskDescriptor>,
}

impl Run {
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Look up a task by id.
    pub fn task(&self, id: usize) -> Option<&TaskDescriptor> {
        id.checked_sub(1).and_then(|i| self.tasks.get(i))
    }

    /// Whether any task needs elevated privileges.
    pub fn needs_sudo(&self) -> bool {
        self.tasks.iter().any(|t| t.sudo)
    }
}

/// Lifecycle state reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventState {
    Ok,
    Failed,
    Unreachable,
    Skipped,
}

impl EventState {
    /// Failed and unreachable both count as failure.
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Failed | Self::Unreachable)
    }
}

impl fmt::Display for EventState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ok => "ok",
            Self::Failed => "failed",
            Self::Unreachable => "unreachable",
            Self::Skipped => "skipped",
        };
        write!(f, "{s}")
    }
}

/// Result payload of one engine event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventResult {
    #[serde(default)]
    pub changed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<Value>,
    /// Everything else the engine reported.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Text of an optional output field; empty values count as absent.
pub(crate) fn output_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Array(items) if items.is_empty() => None,
        other => Some(other.to_string()),
    }
}

/// One record from the engine's event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionEvent {
    /// Task this event belongs to.
    #[serde(alias = "freckles_id", deserialize_with = "task_id")]
    pub task_id: usize,
    pub state: EventState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_name: Option<String>,
    #[serde(default)]
    pub result: EventResult,
}

impl ExecutionEvent {
    /// Parse one line of engine output.
    pub fn parse(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line)
    }

    /// Whether the engine marked this step as not counting toward `changed`.
    pub fn is_ignored(&self) -> bool {
        self.task_name
            .as_deref()
            .is_some_and(|name| name.contains(IGNORE_MARKER))
    }

    /// One-line summary, e.g. `install git: apt -> ok`.
    pub fn summary(&self) -> String {
        format!(
            "{}: {} -> {}",
            self.task_name.as_deref().unwrap_or("n/a"),
            self.action.as_deref().unwrap_or("n/a"),
            self.state
        )
    }
}

/// Accept a task id as number or numeric string.
fn task_id<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<usize, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(usize),
        Text(String),
    }

    match RawId::deserialize(deserializer)? {
        RawId::Number(n) => Ok(n),
        RawId::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| D::Error::custom(format!("invalid task id '{s}'"))),
    }
}

/// Outcome classification of one completed task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictState {
    Skipped,
    Failed,
    Changed,
    NoChange,
}

impl fmt::Display for VerdictState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Skipped => "skipped",
            Self::Failed => "failed",
            Self::Changed => "changed",
            Self::NoChange => "no change",
        };
        write!(f, "{s}")
    }
}

/// Derived result of a task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskVerdict {
    pub task_id: usize,
    pub state: VerdictState,
    pub changed: bool,
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
}

impl TaskVerdict {
    pub fn is_failure(&self) -> bool {
        self.state == VerdictState::Failed
    }
}

/// Result of executing one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    /// One-based run index.
    pub index: usize,
    /// Verdicts ordered by task id.
    pub verdicts: Vec<TaskVerdict>,
    /// Whether the engine process itself exited successfully.
    pub engine_success: bool,
}

impl RunReport {
    /// No failed task and a clean engine exit.
    pub fn is_success(&self) -> bool {
        self.engine_success && !self.verdicts.iter().any(TaskVerdict::is_failure)
    }

    /// Number of verdicts in a given state.
    pub fn count(&self, state: VerdictState) -> usize {
        self.verdicts.iter().filter(|v| v.state == state).count()
    }
}

/// Summary of a whole invocation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecuteSummary {
    /// Reports of the runs that were executed, in order.
    pub runs: Vec<RunReport>,
    /// Runs skipped because they had nothing to do.
    pub empty_runs: usize,
    /// Runs never started because an earlier one failed.
    pub aborted_runs: usize,
}

impl ExecuteSummary {
    /// Check if execution was fully successful (no failures)
    pub fn is_success(&self) -> bool {
        self.runs.iter().all(RunReport::is_success)
    }

    /// Index of the run that failed, if any.
    pub fn failed_run(&self) -> Option<usize> {
        self.runs.iter().find(|r| !r.is_success()).map(|r| r.index)
    }

    /// Total verdicts in a given state, across runs.
    pub fn count(&self, state: VerdictState) -> usize {
        self.runs.iter().map(|r| r.count(state)).sum()
    }

    /// Total number of tasks that reported back
    pub fn total(&self) -> usize {
        self.runs.iter().map(|r| r.verdicts.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn task(roles: &[(&str, &str)], role: Option<RoleRef>) -> TaskDescriptor {
        TaskDescriptor {
            id: 2,
            handler: "install".into(),
            task_type: "install".into(),
            description: "install packages".into(),
            item_name: "git".into(),
            vars: Map::new(),
            sudo: false,
            priority: DEFAULT_PRIORITY,
            unique_task_id: None,
            new_run_after_this: false,
            role,
            roles: roles
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
            leaf_index: 0,
            engine: EngineKind::ansible(),
        }
    }

    #[test]
    fn test_title() {
        assert_eq!(task(&[], None).title(3), "task 02/03: install packages 'git'");
    }

    #[test]
    fn test_resolve_role() {
        let single = task(&[("ansible-stow", "https://github.com/makkus/ansible-stow")], None);
        let role = single.resolve_role().unwrap();
        assert_eq!(role.name, "ansible-stow");
        assert!(role.src.is_some());

        assert!(matches!(task(&[], None).resolve_role(), Err(Error::Bug(_))));
        assert!(matches!(
            task(&[("a", ""), ("b", "")], None).resolve_role(),
            Err(Error::Bug(_))
        ));

        let explicit = RoleSpec {
            name: "custom_role_1".into(),
            src: None,
            tasks: vec![json!({"shell": "ls"})],
        };
        let chosen = task(&[("a", ""), ("b", "")], Some(explicit.clone().into()))
            .resolve_role()
            .unwrap();
        assert_eq!(chosen, explicit);
        assert!(chosen.is_internal());
    }

    #[test]
    fn test_role_selected_by_name() {
        let roles = [
            ("install_brew", "https://github.com/geerlingguy/ansible-role-homebrew.git"),
            ("elliotweiser.osx-command-line-tools", "https://example.com/clt.git"),
        ];
        let selected = task(&roles, Some(RoleRef::Name("install_brew".into())));
        let role = selected.resolve_role().unwrap();
        assert_eq!(role.name, "install_brew");
        assert_eq!(
            role.src.as_deref(),
            Some("https://github.com/geerlingguy/ansible-role-homebrew.git")
        );

        let unlisted = task(&roles, Some(RoleRef::Name("geerlingguy.mac".into())));
        assert_eq!(unlisted.resolve_role().unwrap().src, None);

        let bundled = task(&[("checkout", "frkl:ansible-checkout")], None);
        assert_eq!(bundled.resolve_role().unwrap().src, None);
    }

    #[test]
    fn test_fetchable_roles() {
        let t = task(
            &[
                ("install_brew", "https://example.com/brew.git"),
                ("bundled", "frkl:ansible-nix-pkgs"),
                ("local", ""),
                ("clt", "https://example.com/clt.git"),
            ],
            None,
        );
        let roles: Vec<_> = t.fetchable_roles().collect();
        assert_eq!(
            roles,
            vec![
                ("clt", "https://example.com/clt.git"),
                ("install_brew", "https://example.com/brew.git"),
            ]
        );
    }

    #[test]
    fn test_role_as_string_deserializes() {
        let value = json!({
            "handler": "role",
            "name": "install_brew",
            "desc": "install package manager",
            "item_name": "homebrew",
            "priority": 10,
            "leaf_index": 0,
            "role": "install_brew",
            "roles": {"install_brew": "https://example.com/brew.git"}
        });
        let task: TaskDescriptor = serde_json::from_value(value).unwrap();
        assert_eq!(task.role, Some(RoleRef::Name("install_brew".into())));
    }

    #[test]
    fn test_descriptor_from_meta_keys() {
        let value = json!({
            "handler": "stow",
            "name": "stow",
            "desc": "stowing",
            "item_name": "zsh",
            "priority": 12000,
            "leaf_index": 2,
            "engine": "ansible",
            "role": {"name": "ansible-stow", "src": "https://github.com/makkus/ansible-stow"}
        });
        let task: TaskDescriptor = serde_json::from_value(value).unwrap();
        assert_eq!(task.task_type, "stow");
        assert_eq!(task.id, 0);
        assert!(!task.sudo);
        assert!(task.vars.is_empty());
    }

    #[test]
    fn test_event_parse() {
        let event = ExecutionEvent::parse(
            r#"{"state": "ok", "freckles_id": "3", "action": "apt", "result": {"changed": true, "msg": "done", "rc": 0}}"#,
        )
        .unwrap();
        assert_eq!(event.task_id, 3);
        assert_eq!(event.state, EventState::Ok);
        assert!(event.result.changed);
        assert_eq!(event.result.extra["rc"], json!(0));

        let event =
            ExecutionEvent::parse(r#"{"task_id": 1, "state": "unreachable", "result": {}}"#).unwrap();
        assert!(event.state.is_failure());
        assert!(!event.result.changed);

        assert!(ExecutionEvent::parse(r#"{"task_id": "x", "state": "ok"}"#).is_err());
        assert!(ExecutionEvent::parse(r#"{"task_id": 1, "state": "bogus"}"#).is_err());
    }

    #[test]
    fn test_output_text() {
        assert_eq!(output_text(Some(&json!("x"))), Some("x".into()));
        assert_eq!(output_text(Some(&json!(""))), None);
        assert_eq!(output_text(Some(&json!(null))), None);
        assert_eq!(output_text(Some(&json!(["a"]))), Some(r#"["a"]"#.into()));
        assert_eq!(output_text(None), None);
    }

    #[test]
    fn test_summary_success() {
        let ok = RunReport {
            index: 1,
            verdicts: vec![TaskVerdict {
                task_id: 1,
                state: VerdictState::Changed,
                changed: true,
                stdout: vec![],
                stderr: vec![],
            }],
            engine_success: true,
        };
        let mut summary = ExecuteSummary {
            runs: vec![ok.clone()],
            ..Default::default()
        };
        assert!(summary.is_success());
        assert_eq!(summary.count(VerdictState::Changed), 1);

        summary.runs.push(RunReport {
            index: 2,
            engine_success: false,
            ..ok
        });
        assert!(!summary.is_success());
        assert_eq!(summary.failed_run(), Some(2));
        assert_eq!(summary.total(), 2);
    }
}
