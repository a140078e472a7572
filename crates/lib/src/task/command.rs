//! The external command that builds one image.

use std::path::PathBuf;

use tokio::process::Command;
use tracing::{debug, info};

use super::TaskError;
use crate::unit::UnitDecl;

/// Invokes the build script as
/// `<script> <root> <project-dir> <build-file-name> <image> <artifact>`.
///
/// On success the script must have written the image hash to the artifact.
#[derive(Debug, Clone)]
pub struct BuildCommand {
  script: PathBuf,
  root: PathBuf,
}

impl BuildCommand {
  pub fn new(script: impl Into<PathBuf>, root: impl Into<PathBuf>) -> Self {
    Self {
      script: script.into(),
      root: root.into(),
    }
  }

  /// Build `unit` and check that its artifact names the new image.
  pub async fn build(&self, unit: &UnitDecl) -> Result<(), TaskError> {
    if let Some(parent) = unit.artifact.parent() {
      tokio::fs::create_dir_all(parent).await.map_err(|source| TaskError::Io {
        path: parent.to_path_buf(),
        source,
      })?;
    }

    let build_file = unit.build_file_name();
    info!(project = %unit.project, image = %unit.image, "building image");

    let output = Command::new(&self.script)
      .arg(&self.root)
      .arg(&unit.project_dir)
      .arg(&build_file)
      .arg(&unit.image)
      .arg(&unit.artifact)
      .current_dir(&self.root)
      .output()
      .await
      .map_err(|source| TaskError::Spawn {
        program: self.script.display().to_string(),
        source,
      })?;

    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr);
      let stdout = String::from_utf8_lossy(&output.stdout);
      if !stderr.is_empty() {
        debug!(stderr = %stderr, "build command stderr");
      }
      if !stdout.is_empty() {
        debug!(stdout = %stdout, "build command stdout");
      }
      return Err(TaskError::CommandFailed {
        cmd: format!("{} {}", self.script.display(), unit.image),
        code: output.status.code(),
        stderr: stderr.trim().to_string(),
      });
    }

    let hash = match tokio::fs::read_to_string(&unit.artifact).await {
      Ok(contents) => contents.trim().to_string(),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
      Err(source) => {
        return Err(TaskError::Io {
          path: unit.artifact.clone(),
          source,
        });
      }
    };
    if hash.is_empty() {
      return Err(TaskError::MissingArtifact {
        image: unit.image.clone(),
        path: unit.artifact.clone(),
      });
    }

    info!(image = %unit.image, hash = %hash, "built image");
    Ok(())
  }
}
