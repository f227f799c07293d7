//! Scheduler for dependency-aware concurrent task execution.
//!
//! The Scheduler owns the task graph and the agent pool for a run. It
//! keeps the ready set per role, dispatches ready tasks to idle agents,
//! and is the only writer of task state: agents report outcomes over a
//! single feedback channel and the scheduler applies them.

use crate::agent::{AgentId, AgentMessage, AgentReport, Assignment};
use crate::core::dag::TaskGraph;
use crate::core::task::{Capability, Task, TaskFailure, TaskId, TaskStatus};
use crate::events::EventSink;
use crate::orchestration::pool::AgentPool;
use crate::{flog, flog_debug, flog_warn};
use chrono::{DateTime, Utc};
use petgraph::graph::NodeIndex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Tunables for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Time limit applied to tasks that do not set their own.
    pub task_timeout: Option<Duration>,
}

/// Terminal state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Every task completed.
    Succeeded,
    /// Every task is terminal and at least one failed.
    Failed,
    /// Non-terminal tasks remain but none can make progress.
    Deadlock,
    /// The abort signal fired; all non-terminal tasks were failed.
    Aborted,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Succeeded => write!(f, "succeeded"),
            RunState::Failed => write!(f, "failed"),
            RunState::Deadlock => write!(f, "deadlock"),
            RunState::Aborted => write!(f, "aborted"),
        }
    }
}

/// Final accounting of a run: one record per task, in creation order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub state: RunState,
    pub tasks: Vec<Task>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| &t.id == id)
    }

    pub fn status_of(&self, id: &TaskId) -> Option<TaskStatus> {
        self.get(id).map(|t| t.status)
    }

    pub fn completed(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(|t| t.status == TaskStatus::Completed)
    }

    pub fn failed(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(|t| t.status == TaskStatus::Failed)
    }

    /// Tasks left non-terminal, which only happens on Deadlock.
    pub fn stuck(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(|t| !t.is_finished())
    }
}

/// Dependency-aware dispatcher for one run.
///
/// # Example
///
/// ```ignore
/// let graph = TaskGraph::build(specs)?;
/// let mut scheduler = Scheduler::new(graph, pool, events, SchedulerConfig::default());
/// let abort = scheduler.abort_handle();
/// let report = scheduler.run_to_completion().await;
/// ```
pub struct Scheduler {
    graph: TaskGraph,
    pool: AgentPool,
    events: EventSink,
    config: SchedulerConfig,
    /// Ids of completed tasks; hash-backed so each dependency check is O(1).
    completed: HashSet<TaskId>,
    /// Tasks currently claimed by an agent.
    in_flight: HashSet<TaskId>,
    /// Agents whose task settled but whose provider call is still running.
    lingering: HashSet<AgentId>,
    /// Ready tasks per role, ordered by creation.
    ready: BTreeMap<Capability, BTreeSet<NodeIndex>>,
    /// Count of tasks that reached Completed or Failed.
    finished: usize,
    abort: CancellationToken,
    report_tx: mpsc::UnboundedSender<AgentMessage>,
    report_rx: mpsc::UnboundedReceiver<AgentMessage>,
    started_at: DateTime<Utc>,
}

impl Scheduler {
    /// Create a scheduler for a validated graph.
    ///
    /// Tasks without dependencies are promoted to Ready immediately.
    pub fn new(
        graph: TaskGraph,
        pool: AgentPool,
        events: EventSink,
        config: SchedulerConfig,
    ) -> Self {
        let (report_tx, report_rx) = mpsc::unbounded_channel();
        let mut scheduler = Self {
            graph,
            pool,
            events,
            config,
            completed: HashSet::new(),
            in_flight: HashSet::new(),
            lingering: HashSet::new(),
            ready: BTreeMap::new(),
            finished: 0,
            abort: CancellationToken::new(),
            report_tx,
            report_rx,
            started_at: Utc::now(),
        };

        let roots: Vec<_> = scheduler
            .graph
            .node_indices()
            .filter(|&index| scheduler.graph.dependencies_of(index).next().is_none())
            .collect();
        for index in roots {
            scheduler.promote(index);
        }
        scheduler
    }

    /// Token that aborts the run when cancelled.
    pub fn abort_handle(&self) -> CancellationToken {
        self.abort.clone()
    }

    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    pub fn pool(&self) -> &AgentPool {
        &self.pool
    }

    pub fn completed(&self) -> &HashSet<TaskId> {
        &self.completed
    }

    /// Number of tasks currently running.
    pub fn active_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Ready tasks across all roles, in creation order.
    pub fn ready_tasks(&self) -> Vec<TaskId> {
        let mut indices: Vec<_> = self.ready.values().flatten().copied().collect();
        indices.sort();
        indices
            .into_iter()
            .map(|index| self.graph.task_at(index).id.clone())
            .collect()
    }

    pub fn all_finished(&self) -> bool {
        self.finished == self.graph.task_count()
    }

    /// Mark a Pending task Ready and index it under its role.
    fn promote(&mut self, index: NodeIndex) {
        let task = self.graph.task_at_mut(index);
        task.mark_ready();
        let role = task.capability.clone();
        self.events.status(&task.id, &role, TaskStatus::Ready);
        self.ready.entry(role).or_default().insert(index);
    }

    /// Dispatch ready tasks to idle agents of their role.
    ///
    /// Within a role the earliest-created ready task goes first. Tasks
    /// that find no idle agent stay Ready. Returns the number dispatched.
    pub fn dispatch_ready_tasks(&mut self) -> usize {
        let mut dispatched = 0;
        let roles: Vec<_> = self.ready.keys().cloned().collect();

        for role in roles {
            while self.pool.has_idle(&role) {
                let Some(index) = self.ready.get_mut(&role).and_then(|set| set.pop_first()) else {
                    break;
                };
                let task_id = self.graph.task_at(index).id.clone();
                let Some(agent) = self.pool.claim(&role, &task_id) else {
                    self.ready.entry(role.clone()).or_default().insert(index);
                    break;
                };

                let task = self.graph.task_at_mut(index);
                task.start(agent.id());
                let assignment = Assignment {
                    task_id: task_id.clone(),
                    capability: role.clone(),
                    payload: task.payload.clone(),
                    timeout: task.timeout.or(self.config.task_timeout),
                };
                flog_debug!(
                    "Dispatching task {} ({}) to agent {}",
                    task_id,
                    role,
                    agent.id().short()
                );
                self.in_flight.insert(task_id);

                let cancel = self.abort.child_token();
                let tx = self.report_tx.clone();
                tokio::spawn(async move {
                    let task_id = assignment.task_id.clone();
                    let agent_id = agent.id();
                    let (outcome, pending) = agent.run(assignment, cancel).await;
                    let _ = tx.send(AgentMessage::Report(AgentReport {
                        agent_id,
                        task_id,
                        outcome,
                        slot_held: pending.is_some(),
                    }));
                    if let Some(call) = pending {
                        let _ = call.await;
                        let _ = tx.send(AgentMessage::Released(agent_id));
                    }
                });
                dispatched += 1;
            }
            if self.ready.get(&role).is_some_and(BTreeSet::is_empty) {
                self.ready.remove(&role);
            }
        }

        dispatched
    }

    /// Apply one message from the feedback channel.
    pub fn handle_message(&mut self, message: AgentMessage) {
        match message {
            AgentMessage::Report(report) => self.handle_report(report),
            AgentMessage::Released(agent_id) => self.handle_release(agent_id),
        }
    }

    /// Apply an agent's report to the run state.
    ///
    /// The agent is freed here unless its provider call is still running,
    /// in which case it stays busy until [`Self::handle_release`].
    pub fn handle_report(&mut self, report: AgentReport) {
        let AgentReport {
            agent_id,
            task_id,
            outcome,
            slot_held,
        } = report;

        if slot_held {
            self.lingering.insert(agent_id);
        } else if let Err(e) = self.pool.release(&agent_id) {
            flog_warn!("Report from untracked agent: {}", e);
        }
        if !self.in_flight.remove(&task_id) {
            // Task was already accounted for (e.g. failed by an abort).
            return;
        }
        let Some(index) = self.graph.node_index(&task_id) else {
            flog_warn!("Report for unknown task {}", task_id);
            return;
        };

        match outcome {
            Ok(value) => {
                self.graph.task_at_mut(index).complete(value);
                self.completed.insert(task_id);
                self.finished += 1;
                self.promote_dependents(index);
            }
            Err(failure) => {
                self.graph.task_at_mut(index).fail(failure);
                self.finished += 1;
                self.propagate_failure(index);
            }
        }
    }

    /// Free an agent whose outstanding provider call has returned.
    pub fn handle_release(&mut self, agent_id: AgentId) {
        self.lingering.remove(&agent_id);
        if let Err(e) = self.pool.release(&agent_id) {
            flog_warn!("Release for untracked agent: {}", e);
        }
    }

    /// Number of agents held busy by provider calls that outlived their task.
    pub fn lingering_count(&self) -> usize {
        self.lingering.len()
    }

    fn promote_dependents(&mut self, index: NodeIndex) {
        let dependents: Vec<_> = self.graph.dependents_of(index).collect();
        for dependent in dependents {
            if self.graph.task_at(dependent).status == TaskStatus::Pending
                && self.graph.dependencies_satisfied(dependent, &self.completed)
            {
                self.promote(dependent);
            }
        }
    }

    /// Fail every transitive dependent of a failed task without running it.
    fn propagate_failure(&mut self, index: NodeIndex) {
        let dependency = self.graph.task_at(index).id.clone();
        for dependent in self.graph.transitive_dependents(index) {
            let task = self.graph.task_at_mut(dependent);
            if task.is_finished() {
                continue;
            }
            task.fail(TaskFailure::DependencyFailed {
                dependency: dependency.clone(),
            });
            let (id, role) = (task.id.clone(), task.capability.clone());
            if let Some(set) = self.ready.get_mut(&role) {
                set.remove(&dependent);
            }
            self.events.status(&id, &role, TaskStatus::Failed);
            self.finished += 1;
        }
    }

    /// Fail every non-terminal task as aborted and wait for in-flight
    /// agents to acknowledge cancellation.
    async fn abort_run(&mut self) {
        flog_warn!("Run aborted with {} task(s) in flight", self.in_flight.len());
        self.abort.cancel();

        let indices: Vec<_> = self.graph.node_indices().collect();
        for index in indices {
            let task = self.graph.task_at_mut(index);
            if task.is_finished() {
                continue;
            }
            task.fail(TaskFailure::Aborted);
            let (id, role) = (task.id.clone(), task.capability.clone());
            self.events.status(&id, &role, TaskStatus::Failed);
            self.finished += 1;
        }
        self.ready.clear();

        // Agents return promptly once their token is cancelled.
        while !self.in_flight.is_empty() {
            match self.report_rx.recv().await {
                Some(AgentMessage::Report(report)) => {
                    if report.slot_held {
                        self.lingering.insert(report.agent_id);
                    } else {
                        let _ = self.pool.release(&report.agent_id);
                    }
                    self.in_flight.remove(&report.task_id);
                }
                Some(AgentMessage::Released(agent_id)) => self.handle_release(agent_id),
                None => break,
            }
        }
    }

    fn finish(&mut self, state: RunState) -> RunReport {
        flog!(
            "Run finished: {} ({} completed, {} tasks)",
            state,
            self.completed.len(),
            self.graph.task_count()
        );
        RunReport {
            state,
            tasks: self.graph.all_tasks().cloned().collect(),
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }

    /// Drive the run until every task is terminal, a deadlock is
    /// detected, or the abort handle fires.
    pub async fn run_to_completion(&mut self) -> RunReport {
        self.started_at = Utc::now();
        flog!("Run starting with {} task(s)", self.graph.task_count());

        loop {
            if self.abort.is_cancelled() {
                self.abort_run().await;
                return self.finish(RunState::Aborted);
            }

            self.dispatch_ready_tasks();

            if self.in_flight.is_empty() && self.all_finished() {
                let state = if self.completed.len() == self.graph.task_count() {
                    RunState::Succeeded
                } else {
                    RunState::Failed
                };
                return self.finish(state);
            }

            // Held agents come back through the channel; only then is a stall final.
            if self.in_flight.is_empty() && self.lingering.is_empty() {
                flog_warn!(
                    "Deadlock: {} task(s) cannot make progress",
                    self.graph.task_count() - self.finished
                );
                return self.finish(RunState::Deadlock);
            }

            tokio::select! {
                biased;
                _ = self.abort.cancelled() => {}
                message = self.report_rx.recv() => match message {
                    Some(message) => self.handle_message(message),
                    // The scheduler holds a sender, so the channel cannot close.
                    None => self.abort.cancel(),
                },
            }
        }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("graph", &self.graph)
            .field("completed", &self.completed.len())
            .field("in_flight", &self.in_flight.len())
            .finish()
    }
}
