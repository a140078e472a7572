mod build;
mod clean;
mod graph;
mod plan;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tracing::debug;

use imagegraph_lib::config::Config;
use imagegraph_lib::context::GraphContext;
use imagegraph_lib::execute::{ExecuteConfig, RunReport, Scheduler};
use imagegraph_lib::graph::UnitGraph;
use imagegraph_lib::project::{Project, discover};
use imagegraph_lib::store::DockerCli;
use imagegraph_lib::task::{ProjectTasks, TaskFactory, TaskHandle};

use crate::output::{print_error, print_json, print_stat, print_success, print_warning, symbols};

pub use build::cmd_build;
pub use clean::cmd_clean;
pub use graph::cmd_graph;
pub use plan::cmd_plan;

/// Every discovered project declared into a scheduler and validated.
pub struct Workspace {
  pub config: Arc<Config>,
  pub factory: TaskFactory,
  pub scheduler: Scheduler,
  pub projects: Vec<ProjectTasks>,
  pub graph: UnitGraph,
}

impl Workspace {
  pub fn load(root: &Path, jobs: Option<usize>) -> Result<Self> {
    let root = dunce::canonicalize(root).with_context(|| format!("Root directory not found: {}", root.display()))?;
    let config = Arc::new(Config::from_env(&root));
    debug!(root = %config.root.display(), docker = %config.docker, "loaded config");

    let store = Arc::new(DockerCli::new(config.docker.clone()));
    let context = Arc::new(GraphContext::new(store, config.policy.clone()));
    let factory = TaskFactory::new(context, config.clone());

    let mut execute = ExecuteConfig::default();
    if let Some(jobs) = jobs {
      execute.parallelism = jobs.max(1);
    }
    let mut scheduler = Scheduler::new(config.task_state_dir(), execute);

    let discovered = discover(&config.root, &config.build_file, &config.build_dir)
      .with_context(|| format!("Failed to discover projects under {}", config.root.display()))?;
    let projects = discovered
      .iter()
      .map(|project| factory.declare_project(&mut scheduler, project))
      .collect::<Result<Vec<_>, _>>()
      .context("Failed to declare projects")?;

    let graph = factory.validate().context("Invalid image build graph")?;

    Ok(Self {
      config,
      factory,
      scheduler,
      projects,
      graph,
    })
  }

  /// The chosen task of each named project, or of every project.
  ///
  /// A named directory without a build file is declared on the spot and gets
  /// a placeholder.
  pub fn select(&mut self, names: &[String], pick: fn(&ProjectTasks) -> &TaskHandle) -> Result<Vec<TaskHandle>> {
    if names.is_empty() {
      return Ok(self.projects.iter().map(|p| pick(p).clone()).collect());
    }

    let mut targets = Vec::new();
    for name in names {
      let project = Project::new(&self.config.root, self.config.root.join(name));
      if let Some(tasks) = self.projects.iter().find(|p| p.assemble.name() == format!("{}:assemble", project.name)) {
        targets.push(pick(tasks).clone());
        continue;
      }

      if !project.dir.is_dir() {
        bail!("Unknown project: {}", name);
      }
      let tasks = self
        .factory
        .declare_project(&mut self.scheduler, &project)
        .with_context(|| format!("Failed to declare project {}", name))?;
      targets.push(pick(&tasks).clone());
      self.projects.push(tasks);
    }
    Ok(targets)
  }

  pub fn run(&self, targets: &[TaskHandle]) -> Result<RunReport> {
    let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
    rt.block_on(self.scheduler.run(targets)).context("Task execution failed")
  }
}

/// Print a run report and turn task failures into an error.
pub fn finish(report: &RunReport, json: bool) -> Result<()> {
  if json {
    print_json(report)?;
  } else {
    for task in &report.executed {
      print_success(task.name());
    }
    print_stat("Tasks", &report.total().to_string());
    print_stat("Executed", &report.executed.len().to_string());
    print_stat("Up to date", &report.up_to_date.len().to_string());
    for (task, message) in &report.failed {
      print_error(&format!("{}: {}", task, message));
    }
    for (task, cause) in &report.skipped {
      print_warning(&format!("{} {} skipped, {} failed", symbols::SKIP, task, cause));
    }
  }

  if !report.is_success() {
    bail!(
      "{} task(s) failed, {} skipped",
      report.failed.len(),
      report.skipped.len()
    );
  }
  Ok(())
}
