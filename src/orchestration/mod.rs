//! Orchestration layer.
//!
//! The scheduler drives a run over the task graph, handing ready tasks
//! to the per-role agent pool and applying the outcomes agents report.

mod pool;
mod scheduler;

pub use pool::{AgentHandle, AgentPool};
pub use scheduler::{RunReport, RunState, Scheduler, SchedulerConfig};
