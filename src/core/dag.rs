//! Task graph (directed acyclic graph) for dependency management.
//!
//! The graph is built once, in bulk, from the upstream task list. Edges
//! point from a dependency to its dependent. Construction is the only
//! place where graph shape is validated: every referenced id must exist
//! and the relation must be acyclic.

use crate::core::task::{Task, TaskId, TaskSpec, TaskStatus};
use crate::error::GraphError;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Bfs;
use petgraph::Direction;
use std::collections::{HashMap, HashSet};

/// The task dependency graph.
///
/// Nodes are added in input order, so a node's index doubles as the
/// task's creation order for tie-breaking.
pub struct TaskGraph {
    graph: DiGraph<Task, ()>,
    /// Index mapping from TaskId to NodeIndex for O(1) lookups.
    task_index: HashMap<TaskId, NodeIndex>,
}

impl TaskGraph {
    /// Build and validate a graph from an ordered task list.
    ///
    /// # Errors
    /// - `DuplicateTask` if two specs share an id
    /// - `UnknownDependency` if a spec names an id not in the list
    /// - `Cycle` if the dependency relation is not acyclic
    pub fn build(specs: Vec<TaskSpec>) -> Result<Self, GraphError> {
        let mut graph = DiGraph::with_capacity(specs.len(), specs.len());
        let mut task_index = HashMap::with_capacity(specs.len());

        for spec in specs {
            if task_index.contains_key(&spec.id) {
                return Err(GraphError::DuplicateTask(spec.id));
            }
            let id = spec.id.clone();
            let index = graph.add_node(Task::from_spec(spec));
            task_index.insert(id, index);
        }

        let mut edges = Vec::new();
        for index in graph.node_indices() {
            let task = &graph[index];
            for dep in &task.depends_on {
                let dep_index =
                    task_index
                        .get(dep)
                        .ok_or_else(|| GraphError::UnknownDependency {
                            task: task.id.clone(),
                            dependency: dep.clone(),
                        })?;
                edges.push((*dep_index, index));
            }
        }
        for (from, to) in edges {
            // Repeated declarations of the same dependency collapse to one edge.
            graph.update_edge(from, to, ());
        }

        toposort(&graph, None).map_err(|cycle| GraphError::Cycle {
            task: graph[cycle.node_id()].id.clone(),
        })?;

        Ok(Self { graph, task_index })
    }

    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.task_index.get(id).map(|&index| &self.graph[index])
    }

    pub fn get_mut(&mut self, id: &TaskId) -> Option<&mut Task> {
        let index = *self.task_index.get(id)?;
        self.graph.node_weight_mut(index)
    }

    pub fn node_index(&self, id: &TaskId) -> Option<NodeIndex> {
        self.task_index.get(id).copied()
    }

    pub fn task_at(&self, index: NodeIndex) -> &Task {
        &self.graph[index]
    }

    pub fn task_at_mut(&mut self, index: NodeIndex) -> &mut Task {
        &mut self.graph[index]
    }

    pub fn task_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn dependency_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.task_index.contains_key(id)
    }

    /// Node indices of the tasks `index` depends on.
    pub fn dependencies_of(&self, index: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.neighbors_directed(index, Direction::Incoming)
    }

    /// Node indices of the tasks that depend directly on `index`.
    pub fn dependents_of(&self, index: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.neighbors_directed(index, Direction::Outgoing)
    }

    /// Every task reachable from `index` along dependency edges, excluding
    /// `index` itself, in breadth-first order.
    pub fn transitive_dependents(&self, index: NodeIndex) -> Vec<NodeIndex> {
        let mut bfs = Bfs::new(&self.graph, index);
        let mut out = Vec::new();
        while let Some(next) = bfs.next(&self.graph) {
            if next != index {
                out.push(next);
            }
        }
        out
    }

    /// Whether every dependency of `index` is in the completed set.
    ///
    /// One hash lookup per dependency, independent of how many tasks
    /// have completed.
    pub fn dependencies_satisfied(&self, index: NodeIndex, completed: &HashSet<TaskId>) -> bool {
        self.dependencies_of(index)
            .all(|dep| completed.contains(&self.graph[dep].id))
    }

    /// Pending or Ready tasks whose dependencies are all completed, in
    /// creation order.
    pub fn ready_tasks<'a>(&'a self, completed: &HashSet<TaskId>) -> Vec<&'a Task> {
        self.graph
            .node_indices()
            .filter(|&index| {
                matches!(
                    self.graph[index].status,
                    TaskStatus::Pending | TaskStatus::Ready
                ) && self.dependencies_satisfied(index, completed)
            })
            .map(|index| &self.graph[index])
            .collect()
    }

    /// Tasks in topological order; ties follow petgraph's traversal.
    pub fn topological_order(&self) -> Vec<&Task> {
        // Acyclicity was established in build().
        toposort(&self.graph, None)
            .map(|sorted| sorted.into_iter().map(|index| &self.graph[index]).collect())
            .unwrap_or_default()
    }

    /// All tasks in creation order.
    pub fn all_tasks(&self) -> impl Iterator<Item = &Task> {
        self.graph.node_weights()
    }

    pub fn node_indices(&self) -> impl Iterator<Item = NodeIndex> {
        self.graph.node_indices()
    }

    /// Consume the graph, yielding tasks in creation order.
    pub fn into_tasks(self) -> Vec<Task> {
        let (nodes, _) = self.graph.into_nodes_edges();
        nodes.into_iter().map(|node| node.weight).collect()
    }
}

impl std::fmt::Debug for TaskGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskGraph")
            .field("tasks", &self.task_count())
            .field("dependencies", &self.dependency_count())
            .finish()
    }
}
