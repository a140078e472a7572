//! Build units: one image build per project.
//!
//! A unit goes through two phases:
//! - [`UnitDecl`]: declared from the project directory alone. Names the
//!   produced image, the build file, the build context file set and the
//!   identifier artifact. No image store access.
//! - [`BuildUnit`]: materialized when the unit is scheduled. Adds the base
//!   images, their hash snapshot and the producing units.

mod index;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use walkdir::WalkDir;

use crate::buildfile;
use crate::config::Config;
use crate::consts::IMAGE_NAME_LABEL;
use crate::graph::GraphError;
use crate::image::HashSnapshot;
use crate::project::Project;
use crate::util::hash::short_hash;

pub use index::UnitIndex;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitDecl {
  pub project: String,
  pub project_dir: PathBuf,
  /// Absolute path of the build file.
  pub build_file: PathBuf,
  /// Tagged image name this unit produces.
  pub image: String,
  /// Identifier file written by a successful build.
  pub artifact: PathBuf,
  /// Files of the build context, sorted.
  pub inputs: Vec<PathBuf>,
}

impl UnitDecl {
  /// Declare the unit for `project`, or `None` when it has no build file.
  pub fn declare(project: &Project, config: &Config) -> Result<Option<Self>, GraphError> {
    let build_file = project.dir.join(&config.build_file);
    if !build_file.is_file() {
      return Ok(None);
    }
    let build_file = dunce::canonicalize(&build_file).map_err(|source| GraphError::Io {
      path: build_file.clone(),
      source,
    })?;
    let contents = std::fs::read_to_string(&build_file).map_err(|source| GraphError::Io {
      path: build_file.clone(),
      source,
    })?;

    let repository = buildfile::label(&contents, IMAGE_NAME_LABEL)
      .unwrap_or_else(|| format!("{}{}", config.policy.namespace, project.dir_name()));

    Ok(Some(Self {
      project: project.name.clone(),
      project_dir: project.dir.clone(),
      image: config.policy.dev_image(&repository),
      artifact: artifact_path(&config.artifacts_dir(), &build_file),
      inputs: context_files(&project.dir, &config.build_dir)?,
      build_file,
    }))
  }

  /// File name of the build file within the project directory.
  pub fn build_file_name(&self) -> String {
    self
      .build_file
      .file_name()
      .map(|n| n.to_string_lossy().to_string())
      .unwrap_or_default()
  }
}

/// A unit with its base images resolved at task-creation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildUnit {
  pub decl: Arc<UnitDecl>,
  pub bases: BTreeSet<String>,
  /// Base image hashes as seen when the unit was materialized.
  pub snapshot: HashSnapshot,
  /// Units producing the owned base images.
  pub producers: Vec<Arc<UnitDecl>>,
}

impl BuildUnit {
  pub fn image(&self) -> &str {
    &self.decl.image
  }
}

/// Identifier file location for a build file: a hash of its absolute path.
pub fn artifact_path(artifacts_dir: &Path, build_file: &Path) -> PathBuf {
  let hash = short_hash(build_file.to_string_lossy().as_bytes());
  artifacts_dir.join(format!("{hash}.id"))
}

/// Regular files under `dir`, skipping hidden entries and `build_dir`.
fn context_files(dir: &Path, build_dir: &Path) -> Result<Vec<PathBuf>, GraphError> {
  let walker = WalkDir::new(dir).sort_by_file_name().into_iter().filter_entry(|e| {
    if e.depth() == 0 {
      return true;
    }
    let hidden = e.file_name().to_str().map(|n| n.starts_with('.')).unwrap_or(false);
    !hidden && e.path() != build_dir
  });

  let mut files = Vec::new();
  for entry in walker {
    let entry = entry.map_err(|e| GraphError::Walk { message: e.to_string() })?;
    if entry.file_type().is_file() {
      files.push(entry.into_path());
    }
  }
  files.sort();
  Ok(files)
}
