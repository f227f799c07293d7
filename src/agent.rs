//! Role-bound task executors.
//!
//! An agent claims one task at a time, invokes the service facade for
//! the task's capability on a blocking worker, and reports the outcome
//! back to the scheduler. Agents never touch scheduler state; the only
//! side effect they have is the lifecycle event stream.

use crate::core::task::{Capability, TaskFailure, TaskId, TaskStatus};
use crate::events::EventSink;
use crate::service::{InvocationContext, ServiceFacade, ServiceFailure};
use crate::{flog_debug, flog_error};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(pub Uuid);

impl AgentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for AgentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether an agent's single slot is free.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SlotState {
    #[default]
    Idle,
    Busy { task_id: TaskId },
}

/// Everything an agent needs to execute one task.
#[derive(Debug, Clone)]
pub struct Assignment {
    pub task_id: TaskId,
    pub capability: Capability,
    pub payload: Value,
    pub timeout: Option<Duration>,
}

/// Outcome sent back to the scheduler over its feedback channel.
#[derive(Debug, Clone)]
pub struct AgentReport {
    pub agent_id: AgentId,
    pub task_id: TaskId,
    pub outcome: Result<Value, TaskFailure>,
    /// The provider call outlived the task (timeout or abort). The agent
    /// stays busy until a matching [`AgentMessage::Released`] arrives.
    pub slot_held: bool,
}

/// Messages on the scheduler's feedback channel.
#[derive(Debug, Clone)]
pub enum AgentMessage {
    /// A task settled.
    Report(AgentReport),
    /// A provider call left running by a report with `slot_held` returned.
    Released(AgentId),
}

/// A provider call still running on the blocking pool.
pub type PendingCall = JoinHandle<Result<Value, ServiceFailure>>;

/// Executor bound to a single role.
///
/// Cheap to clone: the facade is shared.
#[derive(Clone)]
pub struct Agent {
    id: AgentId,
    role: Capability,
    facade: Arc<ServiceFacade>,
    events: EventSink,
}

impl Agent {
    pub fn new(role: Capability, facade: Arc<ServiceFacade>, events: EventSink) -> Self {
        Self {
            id: AgentId::new(),
            role,
            facade,
            events,
        }
    }

    pub fn id(&self) -> AgentId {
        self.id
    }

    pub fn role(&self) -> &Capability {
        &self.role
    }

    /// Execute an assignment and wait for its provider call to return.
    pub async fn execute(
        &self,
        assignment: Assignment,
        cancel: CancellationToken,
    ) -> Result<Value, TaskFailure> {
        let (outcome, pending) = self.run(assignment, cancel).await;
        if let Some(call) = pending {
            let _ = call.await;
        }
        outcome
    }

    /// Execute an assignment to completion, timeout, or cancellation.
    ///
    /// Emits Running when work starts and Completed or Failed when it
    /// ends. A cancelled execution returns `TaskFailure::Aborted` without
    /// emitting; the scheduler accounts for aborted tasks itself.
    ///
    /// On timeout or cancellation the outcome is returned at once, along
    /// with the provider call if it has not returned yet. The agent is
    /// not free for new work until that call finishes.
    pub async fn run(
        &self,
        assignment: Assignment,
        cancel: CancellationToken,
    ) -> (Result<Value, TaskFailure>, Option<PendingCall>) {
        let Assignment {
            task_id,
            capability,
            payload,
            timeout,
        } = assignment;
        flog_debug!(
            "Agent {} ({}) executing task {}",
            self.id.short(),
            self.role,
            task_id
        );
        self.events.status(&task_id, &capability, TaskStatus::Running);

        let ctx = InvocationContext {
            task_id: task_id.clone(),
            capability: capability.clone(),
            cancel: cancel.clone(),
            events: self.events.clone(),
        };
        let facade = Arc::clone(&self.facade);
        let mut call = tokio::task::spawn_blocking(move || facade.invoke(&ctx, &payload));
        let expired = async move {
            match timeout {
                Some(limit) => {
                    tokio::time::sleep(limit).await;
                    limit
                }
                None => std::future::pending().await,
            }
        };

        let (outcome, pending) = tokio::select! {
            biased;
            _ = cancel.cancelled() => (Err(TaskFailure::Aborted), Some(call)),
            joined = &mut call => (settle(joined, &cancel), None),
            limit = expired => {
                // Let the provider observe the timeout cooperatively.
                cancel.cancel();
                (Err(TaskFailure::TimedOut { limit }), Some(call))
            }
        };

        match &outcome {
            Ok(_) => {
                self.events.status(&task_id, &capability, TaskStatus::Completed);
            }
            Err(TaskFailure::Aborted) => {
                flog_debug!("Task {} aborted on agent {}", task_id, self.id.short());
            }
            Err(failure) => {
                flog_error!("Task {} failed on agent {}: {}", task_id, self.id.short(), failure);
                self.events.status(&task_id, &capability, TaskStatus::Failed);
            }
        }
        (outcome, pending)
    }
}

/// Map a finished provider call to a task outcome.
///
/// `Cancelled` counts as an abort only when this task's token fired;
/// otherwise the provider gave it up on its own and it is a service failure.
fn settle(
    joined: std::result::Result<Result<Value, ServiceFailure>, JoinError>,
    cancel: &CancellationToken,
) -> Result<Value, TaskFailure> {
    match joined {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(ServiceFailure::Cancelled)) if cancel.is_cancelled() => Err(TaskFailure::Aborted),
        Ok(Err(failure)) => Err(TaskFailure::from(failure)),
        Err(join_err) => Err(TaskFailure::Crashed {
            message: join_err.to_string(),
        }),
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("id", &self.id)
            .field("role", &self.role)
            .finish()
    }
}
