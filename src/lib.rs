//! Autonomous task orchestrator.
//!
//! Runs a pre-built graph of business-automation tasks on role-bound
//! agents, resolving dependencies, bounding concurrency per role and
//! routing each capability to a primary provider with a fallback.

pub mod agent;
pub mod config;
pub mod core;
pub mod error;
pub mod events;
pub mod log;
pub mod orchestration;
pub mod service;

pub use error::{Error, GraphError, Result};
pub use events::{EventKind, EventSink, LifecycleEvent};
pub use orchestration::{RunReport, RunState, Scheduler, SchedulerConfig};
