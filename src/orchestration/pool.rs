//! Agent pool grouped by role.
//!
//! The `AgentPool` owns every agent of a run and tracks each agent's
//! single slot. It is effectively one bounded worker pool per role: the
//! number of tasks of a role that can run at once equals the number of
//! agents registered for it.

use crate::agent::{Agent, AgentId, SlotState};
use crate::config::Config;
use crate::core::task::{Capability, TaskId};
use crate::error::{Error, Result};
use crate::events::EventSink;
use crate::service::ServiceFacade;
use std::collections::HashMap;
use std::sync::Arc;

/// An agent together with its slot state.
#[derive(Debug, Clone)]
pub struct AgentHandle {
    pub agent: Agent,
    pub slot: SlotState,
}

impl AgentHandle {
    pub fn is_idle(&self) -> bool {
        self.slot == SlotState::Idle
    }
}

/// Manages the agents available to a run.
///
/// # Example
///
/// ```ignore
/// let mut pool = AgentPool::new(facade, events);
/// pool.add_agents(Capability::Research, 2);
/// assert_eq!(pool.capacity(&Capability::Research), 2);
/// ```
pub struct AgentPool {
    /// Agents in registration order.
    agents: Vec<AgentHandle>,
    /// Role to positions in `agents`, in registration order.
    by_role: HashMap<Capability, Vec<usize>>,
    index: HashMap<AgentId, usize>,
    facade: Arc<ServiceFacade>,
    events: EventSink,
}

impl AgentPool {
    pub fn new(facade: Arc<ServiceFacade>, events: EventSink) -> Self {
        Self {
            agents: Vec::new(),
            by_role: HashMap::new(),
            index: HashMap::new(),
            facade,
            events,
        }
    }

    /// Build a pool with the agent counts from `[agents]` in the config.
    pub fn from_config(config: &Config, facade: Arc<ServiceFacade>, events: EventSink) -> Self {
        let mut pool = Self::new(facade, events);
        let mut roles: Vec<_> = config.agents.iter().collect();
        roles.sort();
        for (role, &count) in roles {
            pool.add_agents(role.clone(), count);
        }
        pool
    }

    /// Register a new idle agent for `role`.
    pub fn add_agent(&mut self, role: Capability) -> AgentId {
        let agent = Agent::new(role.clone(), Arc::clone(&self.facade), self.events.clone());
        let id = agent.id();
        let position = self.agents.len();
        self.agents.push(AgentHandle {
            agent,
            slot: SlotState::Idle,
        });
        self.by_role.entry(role).or_default().push(position);
        self.index.insert(id, position);
        id
    }

    pub fn add_agents(&mut self, role: Capability, count: usize) -> Vec<AgentId> {
        (0..count).map(|_| self.add_agent(role.clone())).collect()
    }

    /// Claim the first idle agent of `role` for `task_id`.
    ///
    /// Returns a clone of the agent to run the task with, or `None` if
    /// every agent of the role is busy (or the role has none).
    pub fn claim(&mut self, role: &Capability, task_id: &TaskId) -> Option<Agent> {
        let positions = self.by_role.get(role)?;
        let position = positions
            .iter()
            .copied()
            .find(|&p| self.agents[p].is_idle())?;
        let handle = &mut self.agents[position];
        handle.slot = SlotState::Busy {
            task_id: task_id.clone(),
        };
        Some(handle.agent.clone())
    }

    /// Return an agent's slot to Idle.
    pub fn release(&mut self, id: &AgentId) -> Result<()> {
        let position = *self
            .index
            .get(id)
            .ok_or(Error::AgentNotFound { id: *id })?;
        self.agents[position].slot = SlotState::Idle;
        Ok(())
    }

    pub fn get(&self, id: &AgentId) -> Option<&AgentHandle> {
        self.index.get(id).map(|&p| &self.agents[p])
    }

    pub fn has_idle(&self, role: &Capability) -> bool {
        self.idle_count(role) > 0
    }

    pub fn idle_count(&self, role: &Capability) -> usize {
        self.by_role
            .get(role)
            .map(|ps| ps.iter().filter(|&&p| self.agents[p].is_idle()).count())
            .unwrap_or(0)
    }

    /// Number of agents registered for `role`.
    pub fn capacity(&self, role: &Capability) -> usize {
        self.by_role.get(role).map(Vec::len).unwrap_or(0)
    }

    pub fn busy_count(&self) -> usize {
        self.agents.iter().filter(|h| !h.is_idle()).count()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

impl std::fmt::Debug for AgentPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentPool")
            .field("agents", &self.agents.len())
            .field("busy", &self.busy_count())
            .finish()
    }
}
