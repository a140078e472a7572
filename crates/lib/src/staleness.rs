//! Rebuild decision for a materialized unit.
//!
//! A unit's snapshot is captured at task-creation time from the cached
//! registry listing, which may already be out of date by the time the unit is
//! about to run: producers may have rebuilt their images earlier in the same
//! run, and the store can change outside of it. The oracle therefore checks
//! against a fresh listing. It may ask for a rebuild that turns out to be
//! unnecessary, but never skips one that is needed.
//!
//! Across runs the build task compares against the snapshot recorded right
//! after its last successful build ([`StalenessOracle::current_snapshot`]),
//! so a base rebuilt in between is seen as a change.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::image::{HashSnapshot, OwnershipPolicy};
use crate::store::{ImageHashRegistry, StoreError};
use crate::unit::BuildUnit;

/// Outcome of a staleness check, with the reason when stale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Verdict {
  UpToDate,
  /// An owned base image was missing when the snapshot was taken.
  MissingBase { image: String },
  /// The unit's own image is not in the store.
  ImageMissing { image: String },
  /// A base image hash differs from the recorded snapshot.
  BaseChanged {
    image: String,
    recorded: Option<String>,
    current: Option<String>,
  },
}

impl Verdict {
  pub fn is_up_to_date(&self) -> bool {
    matches!(self, Verdict::UpToDate)
  }
}

impl fmt::Display for Verdict {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Verdict::UpToDate => write!(f, "up to date"),
      Verdict::MissingBase { image } => write!(f, "base image {image} was not built"),
      Verdict::ImageMissing { image } => write!(f, "image {image} is not in the store"),
      Verdict::BaseChanged {
        image,
        recorded,
        current,
      } => write!(
        f,
        "base image {image} changed ({} -> {})",
        recorded.as_deref().unwrap_or("none"),
        current.as_deref().unwrap_or("none")
      ),
    }
  }
}

#[derive(Clone)]
pub struct StalenessOracle {
  registry: Arc<ImageHashRegistry>,
  policy: OwnershipPolicy,
}

impl StalenessOracle {
  pub fn new(registry: Arc<ImageHashRegistry>, policy: OwnershipPolicy) -> Self {
    Self { registry, policy }
  }

  /// Decide whether `unit` can skip its build, judged against the snapshot
  /// taken when it was materialized.
  pub async fn check(&self, unit: &BuildUnit) -> Result<Verdict, StoreError> {
    self.check_against(unit, &unit.snapshot).await
  }

  /// Decide whether `unit` can skip its build, judged against `recorded`.
  ///
  /// Rules, first stale verdict wins:
  /// 1. an owned base recorded as unknown
  /// 2. the unit's own image absent from a fresh listing
  /// 3. any difference between `recorded` and a snapshot recomputed from the
  ///    fresh listing
  pub async fn check_against(&self, unit: &BuildUnit, recorded: &HashSnapshot) -> Result<Verdict, StoreError> {
    if let Some((image, _)) = recorded
      .iter()
      .find(|(image, _)| self.policy.is_owned(image) && recorded.is_unknown(image))
    {
      return Ok(self.stale(unit, Verdict::MissingBase { image: image.to_string() }));
    }

    let current = self.registry.fresh().await?;

    if !current.contains(unit.image()) {
      return Ok(self.stale(
        unit,
        Verdict::ImageMissing {
          image: unit.image().to_string(),
        },
      ));
    }

    let recomputed = HashSnapshot::capture(&unit.bases, &current);
    if let Some((image, was, now)) = recorded.first_difference(&recomputed) {
      return Ok(self.stale(
        unit,
        Verdict::BaseChanged {
          image: image.to_string(),
          recorded: was.map(str::to_string),
          current: now.map(str::to_string),
        },
      ));
    }

    debug!(image = %unit.image(), "image is up to date");
    Ok(Verdict::UpToDate)
  }

  /// The unit's base hashes as the store lists them right now.
  pub async fn current_snapshot(&self, unit: &BuildUnit) -> Result<HashSnapshot, StoreError> {
    let current = self.registry.fresh().await?;
    Ok(HashSnapshot::capture(&unit.bases, &current))
  }

  pub async fn is_up_to_date(&self, unit: &BuildUnit) -> Result<bool, StoreError> {
    Ok(self.check(unit).await?.is_up_to_date())
  }

  fn stale(&self, unit: &BuildUnit, verdict: Verdict) -> Verdict {
    info!(image = %unit.image(), reason = %verdict, "image is stale");
    verdict
  }
}
