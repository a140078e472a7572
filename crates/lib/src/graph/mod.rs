//! Inter-image dependency resolution.
//!
//! A unit depends on another when one of its base images is owned by this
//! graph: the producing unit must build that image first. Resolution happens
//! twice:
//! - [`UnitGraph`] validates the whole declared set up front, without touching
//!   the image store.
//! - [`resolve_dependencies`] runs per unit at task-creation time and also
//!   captures the base-image hash snapshot.

mod dag;

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::buildfile::BuildFileError;
use crate::image::{HashSnapshot, OwnershipPolicy};
use crate::store::{ImageIndex, StoreError};
use crate::unit::{UnitDecl, UnitIndex};

pub use dag::UnitGraph;

/// Configuration errors in the declared graph, plus the I/O that can fail
/// while reading it. All of them abort graph evaluation.
#[derive(Debug, Error)]
pub enum GraphError {
  #[error(
    "{consumer} uses {image}, which this build graph owns, but no project produces it; \
     check that the producing project exists and is declared"
  )]
  MissingProducer { consumer: String, image: String },

  #[error("image {image} is produced by both {first} and {second}")]
  DuplicateProducer {
    image: String,
    first: String,
    second: String,
  },

  #[error("dependency cycle through {image}")]
  Cycle { image: String },

  #[error("{project}: {source}")]
  BuildFile {
    project: String,
    #[source]
    source: BuildFileError,
  },

  #[error("image store query failed: {0}")]
  Store(#[from] StoreError),

  #[error("failed to read {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to walk directory: {message}")]
  Walk { message: String },
}

/// Snapshot and producers of one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
  pub snapshot: HashSnapshot,
  /// Units to build before the consumer, ordered by image.
  pub producers: Vec<Arc<UnitDecl>>,
}

/// Resolve `bases` of `consumer` against an image listing and the unit index.
///
/// Every base gets a snapshot entry. Every owned base must have a producer in
/// `index`; a missing one is a configuration error, never skipped.
pub fn resolve_dependencies(
  consumer: &str,
  bases: &BTreeSet<String>,
  images: &ImageIndex,
  index: &UnitIndex,
  policy: &OwnershipPolicy,
) -> Result<Resolution, GraphError> {
  let snapshot = HashSnapshot::capture(bases, images);

  let mut producers = Vec::new();
  for base in bases.iter().filter(|base| policy.is_owned(base)) {
    let producer = index.get(base).ok_or_else(|| GraphError::MissingProducer {
      consumer: consumer.to_string(),
      image: base.clone(),
    })?;
    debug!(consumer = %consumer, producer = %producer.project, image = %base, "dependency edge");
    producers.push(producer);
  }

  Ok(Resolution { snapshot, producers })
}
