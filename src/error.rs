use crate::core::task::TaskId;
use thiserror::Error;

/// Construction-time failures of the task graph.
///
/// Any of these aborts the run before a single agent is dispatched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Duplicate task id: {0}")]
    DuplicateTask(TaskId),

    #[error("Task {task} depends on unknown task {dependency}")]
    UnknownDependency { task: TaskId, dependency: TaskId },

    #[error("Dependency cycle detected at task: {task}")]
    Cycle { task: TaskId },
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Agent not found: {id}")]
    AgentNotFound { id: crate::agent::AgentId },
}

pub type Result<T> = std::result::Result<T, Error>;
