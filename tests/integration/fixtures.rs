//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - Scripted providers with call counting
//! - Building a scheduler with its facade, pool and event stream
//! - Predefined task graphs

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::Receiver;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use foreman::core::{Capability, TaskGraph, TaskId, TaskSpec, TaskStatus};
use foreman::events::{EventKind, EventSink, LifecycleEvent};
use foreman::orchestration::{AgentPool, Scheduler, SchedulerConfig};
use foreman::service::{Provider, ProviderPair, ProviderRank, RetryPolicy, ServiceFacade, ServiceFailure};

/// What a scripted provider does on each call.
#[derive(Clone)]
pub enum Behavior {
    Succeed,
    Unavailable,
    Error,
    InvalidPayload,
    /// Block until the cancel token fires, then report cancellation.
    Hang,
}

/// A provider whose outcome is fixed up front and whose calls are counted.
pub struct ScriptedProvider {
    name: String,
    behavior: Behavior,
    delay: Duration,
    calls: AtomicUsize,
    /// Calls currently inside `invoke`, and the most seen at once.
    active: AtomicUsize,
    peak: AtomicUsize,
    /// Payloads seen, in call order.
    seen: Mutex<Vec<Value>>,
}

impl ScriptedProvider {
    pub fn new(name: &str, behavior: Behavior) -> Arc<Self> {
        Self::with_delay(name, behavior, Duration::ZERO)
    }

    pub fn with_delay(name: &str, behavior: Behavior, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            behavior,
            delay,
            calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of overlapping `invoke` calls so far.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<Value> {
        self.seen.lock().unwrap().clone()
    }

    /// Task ids recorded from payloads of the form `{"task": "<id>"}`.
    pub fn seen_tasks(&self) -> Vec<String> {
        self.seen()
            .iter()
            .filter_map(|p| p["task"].as_str().map(String::from))
            .collect()
    }
}

impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn invoke(&self, payload: &Value, cancel: &CancellationToken) -> Result<Value, ServiceFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(active, Ordering::SeqCst);
        self.seen.lock().unwrap().push(payload.clone());
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        let outcome = match self.behavior {
            Behavior::Succeed => Ok(json!({"provider": self.name, "input": payload})),
            Behavior::Unavailable => Err(ServiceFailure::unavailable(&self.name, "connection refused")),
            Behavior::Error => Err(ServiceFailure::error(&self.name, "upstream returned 500")),
            Behavior::InvalidPayload => Err(ServiceFailure::invalid_payload("payload rejected")),
            Behavior::Hang => {
                while !cancel.is_cancelled() {
                    std::thread::sleep(Duration::from_millis(5));
                }
                Err(ServiceFailure::Cancelled)
            }
        };
        self.active.fetch_sub(1, Ordering::SeqCst);
        outcome
    }
}

/// A scheduler wired to scripted providers, plus the event stream.
pub struct Harness {
    pub scheduler: Scheduler,
    pub events: Receiver<LifecycleEvent>,
}

/// Builder for a [`Harness`].
pub struct HarnessBuilder {
    providers: HashMap<Capability, ProviderPair>,
    agents: Vec<(Capability, usize)>,
    policy: RetryPolicy,
    config: SchedulerConfig,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
            agents: Vec::new(),
            policy: RetryPolicy::default(),
            config: SchedulerConfig::default(),
        }
    }

    pub fn provider(mut self, capability: Capability, primary: Arc<ScriptedProvider>) -> Self {
        self.providers.insert(capability, ProviderPair::new(primary));
        self
    }

    pub fn providers(
        mut self,
        capability: Capability,
        primary: Arc<ScriptedProvider>,
        fallback: Arc<ScriptedProvider>,
    ) -> Self {
        self.providers
            .insert(capability, ProviderPair::new(primary).with_fallback(fallback));
        self
    }

    pub fn agents(mut self, role: Capability, count: usize) -> Self {
        self.agents.push((role, count));
        self
    }

    pub fn policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn task_timeout(mut self, limit: Duration) -> Self {
        self.config.task_timeout = Some(limit);
        self
    }

    pub fn build(self, specs: Vec<TaskSpec>) -> Harness {
        let graph = TaskGraph::build(specs).expect("test graph should be valid");
        let facade = self
            .providers
            .into_iter()
            .fold(ServiceFacade::new(self.policy), |facade, (cap, pair)| {
                facade.register(cap, pair)
            });
        let (sink, events) = EventSink::channel();
        let mut pool = AgentPool::new(Arc::new(facade), sink.clone());
        for (role, count) in self.agents {
            pool.add_agents(role, count);
        }
        Harness {
            scheduler: Scheduler::new(graph, pool, sink, self.config),
            events,
        }
    }
}

impl Harness {
    /// Drain every event emitted so far.
    pub fn drain_events(&self) -> Vec<LifecycleEvent> {
        self.events.try_iter().collect()
    }
}

/// Status transitions only, as (task id, status) pairs in emission order.
pub fn transitions(events: &[LifecycleEvent]) -> Vec<(String, TaskStatus)> {
    events
        .iter()
        .filter_map(|e| e.status().map(|s| (e.task_id.to_string(), s)))
        .collect()
}

/// Position of the first `status` event for `task`.
pub fn position(events: &[LifecycleEvent], task: &str, status: TaskStatus) -> usize {
    transitions(events)
        .iter()
        .position(|(id, s)| id == task && *s == status)
        .unwrap_or_else(|| panic!("no {} event for {}", status, task))
}

/// Provider calls as (task id, rank) pairs in emission order.
pub fn provider_calls(events: &[LifecycleEvent]) -> Vec<(String, ProviderRank)> {
    events
        .iter()
        .filter_map(|e| match e.kind {
            EventKind::ProviderCalled { rank, .. } => Some((e.task_id.to_string(), rank)),
            _ => None,
        })
        .collect()
}

/// A task spec whose payload names the task, so providers can record it.
pub fn task(id: &str, capability: Capability) -> TaskSpec {
    TaskSpec::new(id, capability).with_payload(json!({ "task": id }))
}

/// R (research) -> M (email) -> P (payment).
pub fn launch_chain() -> Vec<TaskSpec> {
    vec![
        task("R", Capability::Research),
        task("M", Capability::Email).depends_on("R"),
        task("P", Capability::Payment).depends_on("M"),
    ]
}

/// A linear chain of `n` research tasks, each depending on the previous one.
pub fn chain(n: usize) -> Vec<TaskSpec> {
    (0..n)
        .map(|i| {
            let spec = task(&format!("t{}", i), Capability::Research);
            if i == 0 {
                spec
            } else {
                spec.depends_on(format!("t{}", i - 1))
            }
        })
        .collect()
}

/// `n` independent tasks of one capability.
pub fn independent(n: usize, capability: Capability) -> Vec<TaskSpec> {
    (0..n)
        .map(|i| task(&format!("job-{}", i), capability.clone()))
        .collect()
}

pub fn id(s: &str) -> TaskId {
    TaskId::from(s)
}
