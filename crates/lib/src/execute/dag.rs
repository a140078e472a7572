//! Execution DAG for materialized tasks.
//!
//! This module provides a directed acyclic graph of task dependencies and
//! computes parallel execution waves.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};

use super::types::ExecuteError;
use crate::task::TaskHandle;

/// A DAG of tasks with an edge from each dependency to its dependent.
pub struct TaskDag {
  graph: DiGraph<TaskHandle, ()>,
  nodes: HashMap<TaskHandle, NodeIndex>,
}

impl TaskDag {
  /// Build the DAG from each task's full dependency set.
  ///
  /// # Errors
  ///
  /// Returns `UnknownTask` if a dependency is not itself a key of `deps`,
  /// and `CycleDetected` if the dependencies form a cycle.
  pub fn new(deps: &BTreeMap<TaskHandle, BTreeSet<TaskHandle>>) -> Result<Self, ExecuteError> {
    let mut graph = DiGraph::new();
    let mut nodes = HashMap::new();

    // First pass: create nodes for all tasks
    for handle in deps.keys() {
      let idx = graph.add_node(handle.clone());
      nodes.insert(handle.clone(), idx);
    }

    // Second pass: add edges from dependency to dependent
    for (handle, task_deps) in deps {
      let dependent_idx = nodes[handle];
      for dep in task_deps {
        let Some(&dep_idx) = nodes.get(dep) else {
          return Err(ExecuteError::UnknownTask(dep.clone()));
        };
        graph.add_edge(dep_idx, dependent_idx, ());
      }
    }

    let dag = Self { graph, nodes };
    dag.verify_acyclic()?;
    Ok(dag)
  }

  fn verify_acyclic(&self) -> Result<(), ExecuteError> {
    toposort(&self.graph, None).map_err(|cycle| ExecuteError::CycleDetected(self.graph[cycle.node_id()].clone()))?;
    Ok(())
  }

  /// Tasks organized into parallel execution waves.
  ///
  /// Each wave contains tasks whose dependencies are all in earlier waves.
  /// Tasks within a wave are sorted by name.
  pub fn waves(&self) -> Result<Vec<Vec<TaskHandle>>, ExecuteError> {
    let mut in_degree: HashMap<NodeIndex, usize> = HashMap::new();
    for idx in self.graph.node_indices() {
      in_degree.insert(idx, self.graph.neighbors_directed(idx, Direction::Incoming).count());
    }

    let mut remaining: HashSet<NodeIndex> = self.graph.node_indices().collect();
    let mut waves = Vec::new();

    while !remaining.is_empty() {
      let ready: Vec<NodeIndex> = remaining.iter().filter(|&&idx| in_degree[&idx] == 0).copied().collect();

      if ready.is_empty() {
        let stuck = remaining.iter().map(|&idx| self.graph[idx].clone()).min();
        return Err(ExecuteError::CycleDetected(stuck.unwrap_or_else(|| TaskHandle::new("?"))));
      }

      for &idx in &ready {
        remaining.remove(&idx);
        for neighbor in self.graph.neighbors_directed(idx, Direction::Outgoing) {
          if let Some(deg) = in_degree.get_mut(&neighbor) {
            *deg = deg.saturating_sub(1);
          }
        }
      }

      let mut wave: Vec<TaskHandle> = ready.into_iter().map(|idx| self.graph[idx].clone()).collect();
      wave.sort();
      waves.push(wave);
    }

    Ok(waves)
  }

  /// Direct dependencies of a task.
  pub fn dependencies(&self, handle: &TaskHandle) -> Vec<TaskHandle> {
    let Some(&idx) = self.nodes.get(handle) else {
      return Vec::new();
    };
    let mut deps: Vec<_> = self
      .graph
      .neighbors_directed(idx, Direction::Incoming)
      .map(|dep| self.graph[dep].clone())
      .collect();
    deps.sort();
    deps.dedup();
    deps
  }

  pub fn task_count(&self) -> usize {
    self.nodes.len()
  }
}
