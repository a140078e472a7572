//! Produced-image name to unit lookup.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use super::UnitDecl;
use crate::graph::GraphError;

/// Append-only map from produced image name to the declaring unit.
///
/// Filled while units are declared and read while dependency edges are
/// resolved; both may happen from several tasks at once.
#[derive(Debug, Default)]
pub struct UnitIndex {
  units: RwLock<HashMap<String, Arc<UnitDecl>>>,
}

impl UnitIndex {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register `unit` under its produced image.
  ///
  /// Fails if another unit already produces the same image.
  pub fn insert(&self, unit: Arc<UnitDecl>) -> Result<(), GraphError> {
    let mut units = self.units.write().unwrap_or_else(PoisonError::into_inner);
    if let Some(existing) = units.get(&unit.image) {
      return Err(GraphError::DuplicateProducer {
        image: unit.image.clone(),
        first: existing.project.clone(),
        second: unit.project.clone(),
      });
    }
    units.insert(unit.image.clone(), unit);
    Ok(())
  }

  pub fn get(&self, image: &str) -> Option<Arc<UnitDecl>> {
    self.units.read().unwrap_or_else(PoisonError::into_inner).get(image).cloned()
  }

  pub fn len(&self) -> usize {
    self.units.read().unwrap_or_else(PoisonError::into_inner).len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Every registered unit, ordered by produced image.
  pub fn all(&self) -> Vec<Arc<UnitDecl>> {
    let mut units: Vec<_> = self
      .units
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .values()
      .cloned()
      .collect();
    units.sort_by(|a, b| a.image.cmp(&b.image));
    units
  }
}
