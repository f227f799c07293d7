//! Core domain models for task orchestration.
//!
//! This module contains the task data model and the dependency graph
//! built from the upstream task list.

pub mod dag;
pub mod task;

pub use dag::TaskGraph;
pub use task::{Capability, Task, TaskFailure, TaskId, TaskSpec, TaskStatus};
