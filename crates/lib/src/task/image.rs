//! The concrete tasks registered per project.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::{ASSEMBLE, BuildCommand, LazyTask, Observations, TaskAction, TaskError, TaskHandle, TaskSpec};
use crate::context::GraphContext;
use crate::image::HashSnapshot;
use crate::staleness::StalenessOracle;
use crate::unit::{BuildUnit, UnitDecl};

/// Builds one unit's image.
pub struct BuildImageTask {
  handle: TaskHandle,
  decl: Arc<UnitDecl>,
  context: Arc<GraphContext>,
  command: Arc<BuildCommand>,
}

impl BuildImageTask {
  pub fn new(handle: TaskHandle, decl: Arc<UnitDecl>, context: Arc<GraphContext>, command: Arc<BuildCommand>) -> Self {
    Self {
      handle,
      decl,
      context,
      command,
    }
  }
}

#[async_trait]
impl LazyTask for BuildImageTask {
  fn handle(&self) -> &TaskHandle {
    &self.handle
  }

  async fn materialize(&self) -> Result<TaskSpec, TaskError> {
    let unit = self.context.materialize(&self.decl).await?;

    let mut properties = BTreeMap::new();
    properties.insert("image".to_string(), self.decl.image.clone());
    properties.insert("build_file".to_string(), self.decl.build_file.display().to_string());

    let depends_on = unit
      .producers
      .iter()
      .map(|producer| TaskHandle::for_step(&producer.project, ASSEMBLE))
      .collect();

    Ok(TaskSpec {
      description: format!("build {}", self.decl.image),
      inputs: self.decl.inputs.clone(),
      properties,
      outputs: vec![self.decl.artifact.clone()],
      depends_on,
      action: Some(Arc::new(BuildImageAction::new(
        unit,
        self.context.oracle(),
        self.command.clone(),
      ))),
    })
  }
}

/// Runs the build command unless the staleness oracle says the image is
/// current.
///
/// After a build, the base hashes are read from a fresh listing and reported
/// as the task's observations. The next up-to-date check compares against
/// them, so a base rebuilt between two runs is noticed.
pub struct BuildImageAction {
  unit: BuildUnit,
  oracle: StalenessOracle,
  command: Arc<BuildCommand>,
}

impl BuildImageAction {
  pub fn new(unit: BuildUnit, oracle: StalenessOracle, command: Arc<BuildCommand>) -> Self {
    Self { unit, oracle, command }
  }
}

#[async_trait]
impl TaskAction for BuildImageAction {
  async fn is_up_to_date(&self, last: &Observations) -> Result<bool, TaskError> {
    let built_against: HashSnapshot = last.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    let verdict = self.oracle.check_against(&self.unit, &built_against).await?;
    Ok(verdict.is_up_to_date())
  }

  async fn run(&self) -> Result<Observations, TaskError> {
    self.command.build(&self.unit.decl).await?;
    let built_against = self.oracle.current_snapshot(&self.unit).await?;
    debug!(image = %self.unit.image(), bases = %built_against, "recorded base hashes");
    Ok(built_against.into_inner())
  }
}

/// Removes one unit's identifier artifact.
pub struct CleanImageTask {
  handle: TaskHandle,
  artifact: PathBuf,
}

impl CleanImageTask {
  pub fn new(handle: TaskHandle, artifact: PathBuf) -> Self {
    Self { handle, artifact }
  }
}

#[async_trait]
impl LazyTask for CleanImageTask {
  fn handle(&self) -> &TaskHandle {
    &self.handle
  }

  async fn materialize(&self) -> Result<TaskSpec, TaskError> {
    Ok(TaskSpec {
      description: format!("delete {}", self.artifact.display()),
      action: Some(Arc::new(CleanArtifactAction::new(self.artifact.clone()))),
      ..TaskSpec::default()
    })
  }
}

/// Deletes a single file; the image itself and everything else under the
/// build directory are left alone.
pub struct CleanArtifactAction {
  path: PathBuf,
}

impl CleanArtifactAction {
  pub fn new(path: PathBuf) -> Self {
    Self { path }
  }
}

#[async_trait]
impl TaskAction for CleanArtifactAction {
  async fn is_up_to_date(&self, _last: &Observations) -> Result<bool, TaskError> {
    Ok(!self.path.exists())
  }

  async fn run(&self) -> Result<Observations, TaskError> {
    match tokio::fs::remove_file(&self.path).await {
      Ok(()) => {
        info!(path = %self.path.display(), "removed artifact");
        Ok(Observations::new())
      }
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        debug!(path = %self.path.display(), "artifact already absent");
        Ok(Observations::new())
      }
      Err(source) => Err(TaskError::Io {
        path: self.path.clone(),
        source,
      }),
    }
  }
}

/// A task with nothing to do, used for aggregate steps and for projects
/// without a build file.
pub struct NoopTask {
  handle: TaskHandle,
}

impl NoopTask {
  pub fn new(handle: TaskHandle) -> Self {
    Self { handle }
  }
}

#[async_trait]
impl LazyTask for NoopTask {
  fn handle(&self) -> &TaskHandle {
    &self.handle
  }

  async fn materialize(&self) -> Result<TaskSpec, TaskError> {
    Ok(TaskSpec::default())
  }
}
