//! Lifecycle event stream.
//!
//! Every task transition and every provider call is published as a
//! [`LifecycleEvent`]. The stream is the core's only side effect outside
//! the scheduler's own state; metrics and dashboards consume it.

use crate::core::task::{Capability, TaskId, TaskStatus};
use crate::service::{ProviderRank, ServiceFailure};
use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum EventKind {
    /// The task moved to a new status.
    Status { status: TaskStatus },
    /// A provider is about to be invoked.
    ProviderCalled {
        provider: String,
        rank: ProviderRank,
        attempt: u32,
    },
    /// A provider invocation failed.
    ProviderFailed {
        provider: String,
        rank: ProviderRank,
        failure: ServiceFailure,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub task_id: TaskId,
    pub role: Capability,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl LifecycleEvent {
    pub fn new(task_id: TaskId, role: Capability, kind: EventKind) -> Self {
        Self {
            task_id,
            role,
            timestamp: Utc::now(),
            kind,
        }
    }

    /// The status carried by a status event.
    pub fn status(&self) -> Option<TaskStatus> {
        match self.kind {
            EventKind::Status { status } => Some(status),
            _ => None,
        }
    }
}

/// Cloneable publisher for lifecycle events.
///
/// Sends never block, so the sink is safe to use from blocking provider
/// threads. A disconnected consumer is ignored.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<Sender<LifecycleEvent>>,
}

impl EventSink {
    /// Create a sink together with the receiving end of the stream.
    pub fn channel() -> (Self, Receiver<LifecycleEvent>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink that drops every event.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: LifecycleEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }

    pub fn status(&self, task_id: &TaskId, role: &Capability, status: TaskStatus) {
        self.emit(LifecycleEvent::new(
            task_id.clone(),
            role.clone(),
            EventKind::Status { status },
        ));
    }
}
