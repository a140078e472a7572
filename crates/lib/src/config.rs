//! Run configuration.
//!
//! Values come from the environment with built-in defaults; the CLI applies
//! its flags on top. Relative paths are resolved against the root directory.

use std::path::{Path, PathBuf};

use crate::consts::{DEFAULT_BUILD_DIR, DEFAULT_BUILD_FILE, DEFAULT_BUILD_SCRIPT, DEFAULT_DOCKER};
use crate::image::OwnershipPolicy;

pub const ENV_BUILD_DIR: &str = "IMAGEGRAPH_BUILD_DIR";
pub const ENV_BUILD_FILE: &str = "IMAGEGRAPH_BUILD_FILE";
pub const ENV_BUILD_SCRIPT: &str = "IMAGEGRAPH_BUILD_SCRIPT";
pub const ENV_DOCKER: &str = "IMAGEGRAPH_DOCKER";
pub const ENV_NAMESPACE: &str = "IMAGEGRAPH_NAMESPACE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
  /// Repository root; projects are discovered beneath it.
  pub root: PathBuf,
  /// Where identifier artifacts and task state are written.
  pub build_dir: PathBuf,
  /// File name that marks a directory as an image project.
  pub build_file: String,
  /// External command that builds one image.
  pub build_script: PathBuf,
  /// Program queried for the image listing.
  pub docker: String,
  pub policy: OwnershipPolicy,
}

impl Config {
  /// Defaults only, ignoring the environment.
  pub fn new(root: impl Into<PathBuf>) -> Self {
    let root = root.into();
    Self {
      build_dir: root.join(DEFAULT_BUILD_DIR),
      build_file: DEFAULT_BUILD_FILE.to_string(),
      build_script: root.join(DEFAULT_BUILD_SCRIPT),
      docker: DEFAULT_DOCKER.to_string(),
      policy: OwnershipPolicy::default(),
      root,
    }
  }

  /// Defaults overridden by `IMAGEGRAPH_*` environment variables.
  pub fn from_env(root: impl Into<PathBuf>) -> Self {
    let mut config = Self::new(root);
    if let Ok(dir) = std::env::var(ENV_BUILD_DIR) {
      config.build_dir = config.resolve(dir);
    }
    if let Ok(name) = std::env::var(ENV_BUILD_FILE) {
      config.build_file = name;
    }
    if let Ok(script) = std::env::var(ENV_BUILD_SCRIPT) {
      config.build_script = config.resolve(script);
    }
    if let Ok(docker) = std::env::var(ENV_DOCKER) {
      config.docker = docker;
    }
    if let Ok(namespace) = std::env::var(ENV_NAMESPACE) {
      config.policy.namespace = namespace;
    }
    config
  }

  /// `path` relative to the root, unless already absolute.
  pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
    self.root.join(path)
  }

  /// Directory holding one identifier file per built unit.
  pub fn artifacts_dir(&self) -> PathBuf {
    self.build_dir.join("docker")
  }

  /// Directory holding recorded task fingerprints.
  pub fn task_state_dir(&self) -> PathBuf {
    self.build_dir.join("tasks")
  }
}
