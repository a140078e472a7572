//! Shared state for one graph evaluation.

use std::sync::Arc;

use tracing::debug;

use crate::buildfile;
use crate::graph::{GraphError, UnitGraph, resolve_dependencies};
use crate::image::OwnershipPolicy;
use crate::staleness::StalenessOracle;
use crate::store::{ImageHashRegistry, ImageStore};
use crate::unit::{BuildUnit, UnitDecl, UnitIndex};

/// The image hash registry, the unit index and the ownership rules of one run.
///
/// Created once per invocation and handed to everything that declares or
/// materializes units.
pub struct GraphContext {
  registry: Arc<ImageHashRegistry>,
  index: UnitIndex,
  policy: OwnershipPolicy,
}

impl GraphContext {
  pub fn new(store: Arc<dyn ImageStore>, policy: OwnershipPolicy) -> Self {
    Self {
      registry: Arc::new(ImageHashRegistry::new(store)),
      index: UnitIndex::new(),
      policy,
    }
  }

  pub fn registry(&self) -> &Arc<ImageHashRegistry> {
    &self.registry
  }

  pub fn index(&self) -> &UnitIndex {
    &self.index
  }

  pub fn policy(&self) -> &OwnershipPolicy {
    &self.policy
  }

  /// Add `decl` to the unit index.
  pub fn declare(&self, decl: UnitDecl) -> Result<Arc<UnitDecl>, GraphError> {
    let decl = Arc::new(decl);
    self.index.insert(decl.clone())?;
    debug!(project = %decl.project, image = %decl.image, "declared unit");
    Ok(decl)
  }

  /// Validate every declared unit without querying the image store.
  pub fn validate(&self) -> Result<UnitGraph, GraphError> {
    UnitGraph::load(&self.index, &self.policy)
  }

  /// Read the build file of `decl` and resolve it against the cached
  /// listing and the unit index.
  pub async fn materialize(&self, decl: &Arc<UnitDecl>) -> Result<BuildUnit, GraphError> {
    let bases = buildfile::read_base_images(&decl.build_file).map_err(|source| GraphError::BuildFile {
      project: decl.project.clone(),
      source,
    })?;
    let images = self.registry.get().await?;
    let resolution = resolve_dependencies(&decl.project, &bases, &images, &self.index, &self.policy)?;

    debug!(
      project = %decl.project,
      bases = bases.len(),
      producers = resolution.producers.len(),
      snapshot = %resolution.snapshot,
      "materialized unit"
    );

    Ok(BuildUnit {
      decl: decl.clone(),
      bases,
      snapshot: resolution.snapshot,
      producers: resolution.producers,
    })
  }

  pub fn oracle(&self) -> StalenessOracle {
    StalenessOracle::new(self.registry.clone(), self.policy.clone())
  }
}
