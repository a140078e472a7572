//! The external image store and the per-run image hash registry.
//!
//! The store is whatever holds built images (a local Docker daemon by
//! default). It is queried as a whole: one listing of every tagged image and
//! its content hash. [`ImageHashRegistry`] caches the first listing for the
//! rest of the run.

mod docker;
mod registry;

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

pub use docker::DockerCli;
pub use registry::ImageHashRegistry;

/// Placeholder the Docker CLI prints for a missing repository or tag.
const NONE_MARKER: &str = "<none>";

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("failed to run {program}: {source}")]
  Spawn {
    program: String,
    #[source]
    source: std::io::Error,
  },

  #[error("{program} exited with code {code:?}: {stderr}")]
  QueryFailed {
    program: String,
    code: Option<i32>,
    stderr: String,
  },

  #[error("malformed image listing at line {line}: {text:?}")]
  MalformedListing { line: usize, text: String },
}

/// Every tagged image known to the store, with its hash.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageIndex {
  images: HashMap<String, String>,
}

impl ImageIndex {
  /// Parse a `name hash` listing, one image per line.
  ///
  /// Blank lines and entries whose repository or tag is `<none>` are skipped.
  pub fn parse(listing: &str) -> Result<Self, StoreError> {
    let mut images = HashMap::new();
    for (i, text) in listing.lines().enumerate() {
      let text = text.trim();
      if text.is_empty() {
        continue;
      }
      let mut fields = text.split_whitespace();
      let (Some(name), Some(hash), None) = (fields.next(), fields.next(), fields.next()) else {
        return Err(StoreError::MalformedListing {
          line: i + 1,
          text: text.to_string(),
        });
      };
      if name.contains(NONE_MARKER) {
        continue;
      }
      images.insert(name.to_string(), hash.to_string());
    }
    Ok(Self { images })
  }

  pub fn hash_of(&self, image: &str) -> Option<&str> {
    self.images.get(image).map(String::as_str)
  }

  pub fn contains(&self, image: &str) -> bool {
    self.images.contains_key(image)
  }

  pub fn len(&self) -> usize {
    self.images.len()
  }

  pub fn is_empty(&self) -> bool {
    self.images.is_empty()
  }
}

impl FromIterator<(String, String)> for ImageIndex {
  fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
    Self {
      images: iter.into_iter().collect(),
    }
  }
}

/// Source of the current image listing.
#[async_trait]
pub trait ImageStore: Send + Sync {
  /// List every tagged image and its hash. Each call queries the store anew.
  async fn list_images(&self) -> Result<ImageIndex, StoreError>;
}
