//! Task synthesis for image projects.
//!
//! [`TaskFactory`] turns each project into tasks registered with a
//! [`TaskHost`]:
//! - `<project>:build-image`: lazy; materializes the unit, depends on the
//!   producers' `assemble` steps and skips itself when the image is up to date
//! - `<project>:clean-image`: deletes the identifier artifact
//! - `<project>:assemble` and `<project>:clean`: aggregate steps wired to the
//!   two above
//!
//! Projects without a build file get a no-op `build-image` placeholder.

mod command;
mod image;

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::config::Config;
use crate::context::GraphContext;
use crate::graph::{GraphError, UnitGraph};
use crate::project::Project;
use crate::store::StoreError;
use crate::unit::UnitDecl;

pub use command::BuildCommand;
pub use image::{BuildImageAction, BuildImageTask, CleanArtifactAction, CleanImageTask, NoopTask};

pub const ASSEMBLE: &str = "assemble";
pub const CLEAN: &str = "clean";
pub const BUILD_IMAGE: &str = "build-image";
pub const CLEAN_IMAGE: &str = "clean-image";

#[derive(Debug, Error)]
pub enum TaskError {
  #[error(transparent)]
  Graph(#[from] GraphError),

  #[error(transparent)]
  Store(#[from] StoreError),

  #[error("failed to run {program}: {source}")]
  Spawn {
    program: String,
    #[source]
    source: std::io::Error,
  },

  #[error("command failed with exit code {code:?}: {cmd}: {stderr}")]
  CommandFailed {
    cmd: String,
    code: Option<i32>,
    stderr: String,
  },

  #[error("build of {image} succeeded but wrote no identifier to {path}")]
  MissingArtifact { image: String, path: PathBuf },

  #[error("io error at {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("task {0} is already registered")]
  Duplicate(TaskHandle),

  #[error("unknown task {0}")]
  Unknown(TaskHandle),
}

/// Name of a registered task, `<project>:<step>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TaskHandle(String);

impl TaskHandle {
  pub fn new(name: impl Into<String>) -> Self {
    Self(name.into())
  }

  pub fn for_step(project: &str, step: &str) -> Self {
    Self(format!("{project}:{step}"))
  }

  pub fn name(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for TaskHandle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// Everything the host needs to schedule and run one task.
#[derive(Clone, Default)]
pub struct TaskSpec {
  pub description: String,
  /// Files whose contents feed the task's fingerprint.
  pub inputs: Vec<PathBuf>,
  /// Named values that feed the task's fingerprint.
  pub properties: BTreeMap<String, String>,
  /// Files the task produces. A task with outputs is only up to date while
  /// they all exist.
  pub outputs: Vec<PathBuf>,
  /// Tasks discovered at materialization that must run first.
  pub depends_on: Vec<TaskHandle>,
  /// `None` for aggregate and placeholder tasks.
  pub action: Option<Arc<dyn TaskAction>>,
}

/// Values an action reports after a successful run. The host stores them with
/// the task's fingerprint and hands them back on the next up-to-date check.
pub type Observations = BTreeMap<String, String>;

#[async_trait]
pub trait TaskAction: Send + Sync {
  /// Extra up-to-date condition checked after outputs and fingerprint.
  ///
  /// `last` is what [`TaskAction::run`] returned the last time the task
  /// succeeded, or empty if nothing was recorded.
  async fn is_up_to_date(&self, _last: &Observations) -> Result<bool, TaskError> {
    Ok(true)
  }

  async fn run(&self) -> Result<Observations, TaskError>;
}

/// A task whose definition is computed only when it is selected to run.
#[async_trait]
pub trait LazyTask: Send + Sync {
  fn handle(&self) -> &TaskHandle;

  async fn materialize(&self) -> Result<TaskSpec, TaskError>;
}

/// Where tasks are registered.
pub trait TaskHost {
  fn register(&mut self, task: Box<dyn LazyTask>) -> Result<TaskHandle, TaskError>;

  /// The aggregate step called `name`, created on first use.
  fn lifecycle(&mut self, name: &str) -> TaskHandle;

  /// Make `task` run after `on`.
  fn depend(&mut self, task: &TaskHandle, on: &TaskHandle) -> Result<(), TaskError>;
}

/// The tasks registered for one project.
#[derive(Debug, Clone)]
pub struct ProjectTasks {
  pub assemble: TaskHandle,
  pub clean: TaskHandle,
  pub build: TaskHandle,
  /// `None` when the project has no build file.
  pub unit: Option<Arc<UnitDecl>>,
}

pub struct TaskFactory {
  context: Arc<GraphContext>,
  config: Arc<Config>,
  command: Arc<BuildCommand>,
}

impl TaskFactory {
  pub fn new(context: Arc<GraphContext>, config: Arc<Config>) -> Self {
    let command = Arc::new(BuildCommand::new(&config.build_script, &config.root));
    Self {
      context,
      config,
      command,
    }
  }

  pub fn context(&self) -> &Arc<GraphContext> {
    &self.context
  }

  /// Declare the tasks of `project`.
  ///
  /// Only the cheap part happens here: the unit is named and indexed. Its
  /// build file is parsed and the image store queried when the host
  /// materializes the build task.
  pub fn declare_project(&self, host: &mut dyn TaskHost, project: &Project) -> Result<ProjectTasks, TaskError> {
    let assemble = host.lifecycle(TaskHandle::for_step(&project.name, ASSEMBLE).name());
    let clean = host.lifecycle(TaskHandle::for_step(&project.name, CLEAN).name());
    let build_handle = TaskHandle::for_step(&project.name, BUILD_IMAGE);

    let Some(decl) = UnitDecl::declare(project, &self.config)? else {
      info!(
        project = %project.name,
        build_file = %self.config.build_file,
        "no build file, registering placeholder"
      );
      let build = host.register(Box::new(NoopTask::new(build_handle)))?;
      host.depend(&assemble, &build)?;
      return Ok(ProjectTasks {
        assemble,
        clean,
        build,
        unit: None,
      });
    };

    let decl = self.context.declare(decl)?;
    let build = host.register(Box::new(BuildImageTask::new(
      build_handle,
      decl.clone(),
      self.context.clone(),
      self.command.clone(),
    )))?;
    host.depend(&assemble, &build)?;

    let clean_image = host.register(Box::new(CleanImageTask::new(
      TaskHandle::for_step(&project.name, CLEAN_IMAGE),
      decl.artifact.clone(),
    )))?;
    host.depend(&clean, &clean_image)?;

    Ok(ProjectTasks {
      assemble,
      clean,
      build,
      unit: Some(decl),
    })
  }

  /// Check every declared unit before anything runs.
  pub fn validate(&self) -> Result<UnitGraph, TaskError> {
    Ok(self.context.validate()?)
  }
}
