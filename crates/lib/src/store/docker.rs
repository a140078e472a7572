//! Image store backed by the `docker` command line.

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::{ImageIndex, ImageStore, StoreError};

const LIST_FORMAT: &str = "{{.Repository}}:{{.Tag}} {{.ID}}";

/// Lists images with `docker images --no-trunc`.
#[derive(Debug, Clone)]
pub struct DockerCli {
  program: String,
}

impl DockerCli {
  /// `program` is the docker executable (a name on `PATH` or a path).
  pub fn new(program: impl Into<String>) -> Self {
    Self {
      program: program.into(),
    }
  }
}

#[async_trait]
impl ImageStore for DockerCli {
  async fn list_images(&self) -> Result<ImageIndex, StoreError> {
    debug!(program = %self.program, "querying image store");

    let output = Command::new(&self.program)
      .args(["images", "--no-trunc", "--format", LIST_FORMAT])
      .output()
      .await
      .map_err(|source| StoreError::Spawn {
        program: self.program.clone(),
        source,
      })?;

    if !output.status.success() {
      return Err(StoreError::QueryFailed {
        program: self.program.clone(),
        code: output.status.code(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
      });
    }

    let index = ImageIndex::parse(&String::from_utf8_lossy(&output.stdout))?;
    debug!(images = index.len(), "image store listing received");
    Ok(index)
  }
}
