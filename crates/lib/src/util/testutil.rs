//! Test utilities for imagegraph-lib.
//!
//! This module provides an in-memory image store and helpers for tests that
//! need executable scripts or project trees on disk.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::store::{ImageIndex, ImageStore, StoreError};

/// In-memory image store that counts how often it is queried.
pub struct FakeStore {
  images: Mutex<Vec<(String, String)>>,
  queries: AtomicUsize,
  delay: Option<Duration>,
  fail: bool,
}

impl FakeStore {
  pub fn new(images: &[(&str, &str)]) -> Self {
    Self {
      images: Mutex::new(to_owned(images)),
      queries: AtomicUsize::new(0),
      delay: None,
      fail: false,
    }
  }

  /// A store whose every query fails.
  pub fn failing() -> Self {
    Self {
      fail: true,
      ..Self::new(&[])
    }
  }

  pub fn with_delay_ms(mut self, millis: u64) -> Self {
    self.delay = Some(Duration::from_millis(millis));
    self
  }

  /// Replace the listing returned by later queries.
  pub fn set(&self, images: &[(&str, &str)]) {
    *self.images.lock().unwrap() = to_owned(images);
  }

  pub fn queries(&self) -> usize {
    self.queries.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl ImageStore for FakeStore {
  async fn list_images(&self) -> Result<ImageIndex, StoreError> {
    self.queries.fetch_add(1, Ordering::SeqCst);
    if let Some(delay) = self.delay {
      tokio::time::sleep(delay).await;
    }
    if self.fail {
      return Err(StoreError::QueryFailed {
        program: "fake".to_string(),
        code: Some(1),
        stderr: "store unavailable".to_string(),
      });
    }
    Ok(self.images.lock().unwrap().iter().cloned().collect())
  }
}

fn to_owned(images: &[(&str, &str)]) -> Vec<(String, String)> {
  images.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

/// Write an executable `/bin/sh` script into `dir`.
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
  use std::os::unix::fs::PermissionsExt;

  let path = dir.join(name);
  std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
  std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
  path
}

/// Write `contents` to `root/relative`, creating parent directories.
pub fn write_file(root: &Path, relative: &str, contents: &str) -> PathBuf {
  let path = root.join(relative);
  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent).unwrap();
  }
  std::fs::write(&path, contents).unwrap();
  path
}

/// A declared unit with placeholder paths under `/repo`.
pub fn decl(project: &str, image: &str) -> std::sync::Arc<crate::unit::UnitDecl> {
  std::sync::Arc::new(crate::unit::UnitDecl {
    project: project.to_string(),
    project_dir: PathBuf::from("/repo").join(project),
    build_file: PathBuf::from("/repo").join(project).join("Dockerfile"),
    image: image.to_string(),
    artifact: PathBuf::from("/repo/build/docker").join(format!("{project}.id")),
    inputs: vec![],
  })
}
