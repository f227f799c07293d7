//! Task data model for the execution graph.
//!
//! Tasks are the atomic units of work claimed by agents. Each task
//! names the capability it needs, the tasks it depends on, and an
//! opaque payload handed to the capability's provider.

use crate::agent::AgentId;
use crate::error::Result;
use crate::service::ServiceFailure;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

/// Unique identifier for a task within a run.
///
/// Ids are supplied by the upstream task list so that dependencies can
/// refer to them; `generate` mints a UUID-based id when none is given.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    /// Create a fresh unique task identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Return at most the first 8 characters for display.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(8) {
            Some((end, _)) => &self.0[..end],
            None => &self.0,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Category of externally provided action a task needs.
///
/// Doubles as the agent role: an agent only claims tasks of its own
/// capability. Serialized as a plain lowercase string so it can key
/// TOML tables.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Capability {
    Research,
    Email,
    Social,
    Payment,
    Custom(String),
}

impl Capability {
    pub fn as_str(&self) -> &str {
        match self {
            Capability::Research => "research",
            Capability::Email => "email",
            Capability::Social => "social",
            Capability::Payment => "payment",
            Capability::Custom(name) => name,
        }
    }
}

impl From<String> for Capability {
    fn from(s: String) -> Self {
        match s.to_lowercase().as_str() {
            "research" => Capability::Research,
            "email" => Capability::Email,
            "social" => Capability::Social,
            "payment" => Capability::Payment,
            _ => Capability::Custom(s),
        }
    }
}

impl From<&str> for Capability {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<Capability> for String {
    fn from(c: Capability) -> Self {
        c.as_str().to_string()
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Task status in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created, waiting on at least one dependency.
    #[default]
    Pending,
    /// Every dependency completed; waiting for an idle agent.
    Ready,
    /// Claimed by an agent.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished unsuccessfully, or never ran because a dependency failed.
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Ready => write!(f, "ready"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Why a task ended up Failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum TaskFailure {
    /// The capability's providers could not serve the request.
    #[error("{failure}")]
    Service { failure: ServiceFailure },
    /// An upstream task failed, so this one never ran.
    #[error("dependency {dependency} failed")]
    DependencyFailed { dependency: TaskId },
    /// The execution exceeded its time limit.
    #[error("timed out after {limit:?}")]
    TimedOut { limit: Duration },
    /// The run was aborted before this task finished.
    #[error("aborted")]
    Aborted,
    /// The provider call panicked or its worker was lost.
    #[error("crashed: {message}")]
    Crashed { message: String },
}

impl From<ServiceFailure> for TaskFailure {
    fn from(failure: ServiceFailure) -> Self {
        TaskFailure::Service { failure }
    }
}

/// One entry of the upstream task list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub id: TaskId,
    pub capability: Capability,
    #[serde(default)]
    pub depends_on: Vec<TaskId>,
    #[serde(default)]
    pub payload: Value,
    /// Overrides the scheduler's per-task time limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl TaskSpec {
    pub fn new(id: impl Into<TaskId>, capability: Capability) -> Self {
        Self {
            id: id.into(),
            capability,
            depends_on: Vec::new(),
            payload: Value::Null,
            timeout_ms: None,
        }
    }

    pub fn depends_on(mut self, id: impl Into<TaskId>) -> Self {
        self.depends_on.push(id.into());
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_timeout(mut self, limit: Duration) -> Self {
        self.timeout_ms = Some(u64::try_from(limit.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Load an ordered task list from a JSON array file.
    pub fn load_all(path: &Path) -> Result<Vec<TaskSpec>> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// A task owned by the scheduler for the duration of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub capability: Capability,
    pub depends_on: Vec<TaskId>,
    pub payload: Value,
    pub timeout: Option<Duration>,
    pub status: TaskStatus,
    /// Provider output on success.
    pub result: Option<Value>,
    /// Failure record when status is Failed.
    pub failure: Option<TaskFailure>,
    /// Agent that executed the task.
    pub agent_id: Option<AgentId>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a Pending task from its specification.
    pub fn from_spec(spec: TaskSpec) -> Self {
        Self {
            id: spec.id,
            capability: spec.capability,
            depends_on: spec.depends_on,
            payload: spec.payload,
            timeout: spec.timeout_ms.map(Duration::from_millis),
            status: TaskStatus::Pending,
            result: None,
            failure: None,
            agent_id: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn mark_ready(&mut self) {
        self.status = TaskStatus::Ready;
    }

    /// Transition to Running under the given agent.
    pub fn start(&mut self, agent_id: AgentId) {
        self.status = TaskStatus::Running;
        self.agent_id = Some(agent_id);
        self.started_at = Some(Utc::now());
    }

    pub fn complete(&mut self, result: Value) {
        self.status = TaskStatus::Completed;
        self.result = Some(result);
        self.completed_at = Some(Utc::now());
    }

    pub fn fail(&mut self, failure: TaskFailure) {
        self.status = TaskStatus::Failed;
        self.failure = Some(failure);
        self.completed_at = Some(Utc::now());
    }

    /// Check if the task is in a terminal state (Completed or Failed).
    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }
}
