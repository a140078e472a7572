//! Project discovery.
//!
//! A project is a directory under the root. Projects that contain the
//! configured build file produce an image; others get a placeholder task.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::graph::GraphError;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Project {
  /// Path relative to the root, `/`-separated; `.` for the root itself.
  pub name: String,
  pub dir: PathBuf,
}

impl Project {
  pub fn new(root: &Path, dir: impl Into<PathBuf>) -> Self {
    let dir = dir.into();
    let relative = dir.strip_prefix(root).unwrap_or(&dir);
    let name = relative
      .components()
      .map(|c| c.as_os_str().to_string_lossy())
      .collect::<Vec<_>>()
      .join("/");
    Self {
      name: if name.is_empty() { ".".to_string() } else { name },
      dir,
    }
  }

  /// Last path component of the project directory.
  pub fn dir_name(&self) -> String {
    self
      .dir
      .file_name()
      .map(|n| n.to_string_lossy().to_string())
      .unwrap_or_else(|| self.name.clone())
  }
}

/// Every directory under `root` that contains `build_file`, sorted by name.
///
/// Hidden directories and `skip` (the build output directory) are not entered.
pub fn discover(root: &Path, build_file: &str, skip: &Path) -> Result<Vec<Project>, GraphError> {
  let walker = WalkDir::new(root).sort_by_file_name().into_iter().filter_entry(|e| {
    if !e.file_type().is_dir() || e.depth() == 0 {
      return true;
    }
    let hidden = e.file_name().to_str().map(|n| n.starts_with('.')).unwrap_or(false);
    !hidden && e.path() != skip
  });

  let mut projects = Vec::new();
  for entry in walker {
    let entry = entry.map_err(|e| GraphError::Walk { message: e.to_string() })?;
    if entry.file_type().is_dir() && entry.path().join(build_file).is_file() {
      projects.push(Project::new(root, entry.path()));
    }
  }
  projects.sort();
  Ok(projects)
}
