//! Whole-graph validation of declared units.
//!
//! Built once after every project is declared and before any image store
//! query. It checks the declaration-order assumption explicitly: every owned
//! base image has a producer and the producers form no cycle.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};

use super::GraphError;
use crate::buildfile;
use crate::image::OwnershipPolicy;
use crate::unit::{UnitDecl, UnitIndex};

/// DAG of declared units, with an edge from producer to consumer.
pub struct UnitGraph {
  graph: DiGraph<Arc<UnitDecl>, ()>,
  nodes: HashMap<String, NodeIndex>,
}

impl UnitGraph {
  /// Read each indexed unit's build file and validate the resulting graph.
  pub fn load(index: &UnitIndex, policy: &OwnershipPolicy) -> Result<Self, GraphError> {
    let units = index
      .all()
      .into_iter()
      .map(|unit| {
        let bases = buildfile::read_base_images(&unit.build_file).map_err(|source| GraphError::BuildFile {
          project: unit.project.clone(),
          source,
        })?;
        Ok((unit, bases))
      })
      .collect::<Result<Vec<_>, GraphError>>()?;
    Self::new(units, policy)
  }

  /// Validate `units` given each one's base images.
  ///
  /// # Errors
  ///
  /// - `MissingProducer` if an owned base image has no unit producing it
  /// - `Cycle` if units depend on each other, including on themselves
  pub fn new(units: Vec<(Arc<UnitDecl>, BTreeSet<String>)>, policy: &OwnershipPolicy) -> Result<Self, GraphError> {
    let mut graph = DiGraph::new();
    let mut nodes = HashMap::new();

    // First pass: every producer.
    for (unit, _) in &units {
      let idx = graph.add_node(unit.clone());
      nodes.insert(unit.image.clone(), idx);
    }

    // Second pass: consumer edges.
    for (unit, bases) in &units {
      let consumer = nodes[&unit.image];
      for base in bases.iter().filter(|base| policy.is_owned(base)) {
        let Some(&producer) = nodes.get(base) else {
          return Err(GraphError::MissingProducer {
            consumer: unit.project.clone(),
            image: base.clone(),
          });
        };
        graph.add_edge(producer, consumer, ());
      }
    }

    let dag = Self { graph, nodes };
    dag.topological_order()?;
    Ok(dag)
  }

  /// Units ordered so that producers come before their consumers.
  pub fn topological_order(&self) -> Result<Vec<Arc<UnitDecl>>, GraphError> {
    let sorted = toposort(&self.graph, None).map_err(|cycle| GraphError::Cycle {
      image: self.graph[cycle.node_id()].image.clone(),
    })?;
    Ok(sorted.into_iter().map(|idx| self.graph[idx].clone()).collect())
  }

  /// Direct producers of the unit building `image`.
  pub fn dependencies(&self, image: &str) -> Vec<Arc<UnitDecl>> {
    let Some(&idx) = self.nodes.get(image) else {
      return Vec::new();
    };
    let mut deps: Vec<_> = self
      .graph
      .neighbors_directed(idx, Direction::Incoming)
      .map(|dep| self.graph[dep].clone())
      .collect();
    deps.sort_by(|a, b| a.image.cmp(&b.image));
    deps.dedup_by(|a, b| a.image == b.image);
    deps
  }

  pub fn unit_count(&self) -> usize {
    self.graph.node_count()
  }

  pub fn edge_count(&self) -> usize {
    self.graph.edge_count()
  }
}
