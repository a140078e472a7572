//! Hashing utilities for artifact naming and task fingerprints.
//!
//! Artifact file names use [`short_hash`] of the absolute build-file path;
//! task fingerprints combine [`hash_file`] digests of the declared inputs.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::consts::ARTIFACT_HASH_PREFIX_LEN;

/// Lowercase hex SHA256 digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub String);

impl ContentHash {
  fn of(hasher: Sha256) -> Self {
    Self(format!("{:x}", hasher.finalize()))
  }
}

impl std::fmt::Display for ContentHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.0)
  }
}

#[derive(Debug, thiserror::Error)]
pub enum HashError {
  #[error("failed to read {}", path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// Stream a file through SHA256.
pub fn hash_file(path: &Path) -> Result<ContentHash, HashError> {
  let read_err = |source| HashError::Read {
    path: path.to_path_buf(),
    source,
  };
  let mut file = File::open(path).map_err(read_err)?;
  let mut hasher = Sha256::new();
  io::copy(&mut file, &mut hasher).map_err(read_err)?;
  Ok(ContentHash::of(hasher))
}

pub fn hash_bytes(data: &[u8]) -> ContentHash {
  let mut hasher = Sha256::new();
  hasher.update(data);
  ContentHash::of(hasher)
}

/// Truncated hash of `data`, short enough to keep file names readable.
pub fn short_hash(data: &[u8]) -> String {
  let full = hash_bytes(data);
  full.0[..ARTIFACT_HASH_PREFIX_LEN].to_string()
}
