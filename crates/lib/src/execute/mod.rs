//! In-process task host.
//!
//! [`Scheduler`] collects registered tasks and runs a selection of them:
//! - materializes the targets and, transitively, everything they depend on
//! - orders them in a DAG and computes parallel execution waves
//! - skips tasks that are up to date
//! - tracks failures and skips dependent tasks

pub mod dag;
pub mod state;
pub mod types;

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::{Id as JoinId, JoinSet};
use tracing::{debug, error, info, warn};

use crate::task::{LazyTask, NoopTask, TaskAction, TaskError, TaskHandle, TaskHost, TaskSpec};

pub use dag::TaskDag;
pub use state::{TaskRecord, TaskStateStore, fingerprint};
pub use types::{ExecuteConfig, ExecuteError, RunReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
  Executed,
  UpToDate,
}

pub struct Scheduler {
  tasks: BTreeMap<TaskHandle, Box<dyn LazyTask>>,
  /// Dependencies declared at registration time.
  edges: BTreeMap<TaskHandle, BTreeSet<TaskHandle>>,
  state: Arc<TaskStateStore>,
  config: ExecuteConfig,
}

impl Scheduler {
  pub fn new(state_dir: impl Into<PathBuf>, config: ExecuteConfig) -> Self {
    Self {
      tasks: BTreeMap::new(),
      edges: BTreeMap::new(),
      state: Arc::new(TaskStateStore::new(state_dir)),
      config,
    }
  }

  pub fn contains(&self, handle: &TaskHandle) -> bool {
    self.tasks.contains_key(handle)
  }

  /// The record left by the last successful run of `handle`.
  pub fn recorded(&self, handle: &TaskHandle) -> Option<TaskRecord> {
    self.state.recorded(handle)
  }

  /// Every registered task, sorted by name.
  pub fn handles(&self) -> Vec<TaskHandle> {
    self.tasks.keys().cloned().collect()
  }

  /// Materialize `targets` with everything they depend on, then run them.
  ///
  /// Materialization errors abort the run before any task executes. Task
  /// failures are recorded in the report and only affect their dependents.
  pub async fn run(&self, targets: &[TaskHandle]) -> Result<RunReport, ExecuteError> {
    let (specs, deps) = self.materialize(targets).await?;
    let dag = TaskDag::new(&deps)?;
    let waves = dag.waves()?;

    info!(
      task_count = dag.task_count(),
      wave_count = waves.len(),
      "computed execution waves"
    );

    let mut report = RunReport::default();
    let mut failed: HashSet<TaskHandle> = HashSet::new();
    let semaphore = Arc::new(Semaphore::new(self.config.parallelism.max(1)));

    for (wave_idx, wave) in waves.iter().enumerate() {
      debug!(wave = wave_idx, tasks = wave.len(), "executing wave");

      let mut ready = Vec::new();
      for handle in wave {
        let deps = dag.dependencies(handle);
        if let Some(failed_dep) = deps.iter().find(|dep| failed.contains(*dep)) {
          warn!(task = %handle, failed_dep = %failed_dep, "skipping task due to failed dependency");
          report.skipped.insert(handle.clone(), failed_dep.clone());
          failed.insert(handle.clone());
        } else {
          ready.push(handle.clone());
        }
      }

      if ready.is_empty() {
        continue;
      }

      for (handle, result) in self.execute_wave(&ready, &specs, semaphore.clone()).await {
        match result {
          Ok(Outcome::Executed) => {
            info!(task = %handle, "task succeeded");
            report.executed.push(handle);
          }
          Ok(Outcome::UpToDate) => {
            debug!(task = %handle, "task up to date");
            report.up_to_date.push(handle);
          }
          Err(e) => {
            error!(task = %handle, error = %e, "task failed");
            self.state.forget(&handle);
            failed.insert(handle.clone());
            report.failed.insert(handle, e.to_string());
          }
        }
      }
    }

    report.sort();
    info!(
      executed = report.executed.len(),
      up_to_date = report.up_to_date.len(),
      failed = report.failed.len(),
      skipped = report.skipped.len(),
      "task execution complete"
    );

    Ok(report)
  }

  /// Worklist materialization of `targets` and their transitive dependencies.
  async fn materialize(
    &self,
    targets: &[TaskHandle],
  ) -> Result<
    (
      BTreeMap<TaskHandle, TaskSpec>,
      BTreeMap<TaskHandle, BTreeSet<TaskHandle>>,
    ),
    ExecuteError,
  > {
    let mut specs = BTreeMap::new();
    let mut deps = BTreeMap::new();
    let mut queue: VecDeque<TaskHandle> = targets.iter().cloned().collect();

    while let Some(handle) = queue.pop_front() {
      if specs.contains_key(&handle) {
        continue;
      }
      let task = self
        .tasks
        .get(&handle)
        .ok_or_else(|| ExecuteError::UnknownTask(handle.clone()))?;
      let spec = task.materialize().await.map_err(|source| ExecuteError::Materialize {
        task: handle.clone(),
        source,
      })?;

      let mut task_deps = self.edges.get(&handle).cloned().unwrap_or_default();
      task_deps.extend(spec.depends_on.iter().cloned());
      for dep in &task_deps {
        if !self.tasks.contains_key(dep) {
          return Err(ExecuteError::UnknownTask(dep.clone()));
        }
        queue.push_back(dep.clone());
      }

      debug!(task = %handle, deps = task_deps.len(), "materialized task");
      deps.insert(handle.clone(), task_deps);
      specs.insert(handle, spec);
    }

    Ok((specs, deps))
  }

  /// Run the tasks of one wave in parallel.
  async fn execute_wave(
    &self,
    handles: &[TaskHandle],
    specs: &BTreeMap<TaskHandle, TaskSpec>,
    semaphore: Arc<Semaphore>,
  ) -> Vec<(TaskHandle, Result<Outcome, ExecuteError>)> {
    let mut join_set = JoinSet::new();
    let mut spawned: HashMap<JoinId, TaskHandle> = HashMap::new();

    for handle in handles {
      let handle = handle.clone();
      let spec = specs.get(&handle).cloned().unwrap_or_default();
      let state = self.state.clone();
      let semaphore = semaphore.clone();

      let task_handle = handle.clone();
      let abort = join_set.spawn(async move {
        let _permit = semaphore.acquire_owned().await;
        let result = run_task(&task_handle, spec, &state).await;
        (task_handle, result)
      });
      spawned.insert(abort.id(), handle);
    }

    let mut results = Vec::new();
    while let Some(join_result) = join_set.join_next_with_id().await {
      match join_result {
        Ok((_, result)) => results.push(result),
        Err(e) => {
          let Some(handle) = spawned.remove(&e.id()) else {
            error!(error = %e, "untracked task panicked");
            continue;
          };
          error!(task = %handle, error = %e, "task panicked");
          results.push((handle.clone(), Err(ExecuteError::Panicked(handle))));
        }
      }
    }
    results
  }
}

impl TaskHost for Scheduler {
  fn register(&mut self, task: Box<dyn LazyTask>) -> Result<TaskHandle, TaskError> {
    let handle = task.handle().clone();
    if self.tasks.contains_key(&handle) {
      return Err(TaskError::Duplicate(handle));
    }
    debug!(task = %handle, "registered task");
    self.tasks.insert(handle.clone(), task);
    Ok(handle)
  }

  fn lifecycle(&mut self, name: &str) -> TaskHandle {
    let handle = TaskHandle::new(name);
    if !self.tasks.contains_key(&handle) {
      self.tasks.insert(handle.clone(), Box::new(NoopTask::new(handle.clone())));
    }
    handle
  }

  fn depend(&mut self, task: &TaskHandle, on: &TaskHandle) -> Result<(), TaskError> {
    for handle in [task, on] {
      if !self.tasks.contains_key(handle) {
        return Err(TaskError::Unknown(handle.clone()));
      }
    }
    self.edges.entry(task.clone()).or_default().insert(on.clone());
    Ok(())
  }
}

/// Run one task unless it is up to date.
///
/// A task with outputs is up to date when every output exists, its
/// fingerprint matches the recorded one and its action agrees. A task without
/// outputs asks only its action.
async fn run_task(handle: &TaskHandle, spec: TaskSpec, state: &TaskStateStore) -> Result<Outcome, ExecuteError> {
  let Some(action) = spec.action.clone() else {
    return Ok(Outcome::UpToDate);
  };
  let task_error = |source: TaskError| ExecuteError::Task {
    task: handle.clone(),
    source,
  };

  let fingerprint = if spec.outputs.is_empty() {
    None
  } else {
    Some(fingerprint(&spec)?)
  };

  let record = fingerprint.as_ref().and_then(|_| state.recorded(handle));
  let outputs_current = match &fingerprint {
    None => true,
    Some(current) => {
      let missing = spec.outputs.iter().find(|path| !path.exists());
      if let Some(path) = missing {
        debug!(task = %handle, output = %path.display(), "output missing");
        false
      } else if record.as_ref().map(|r| &r.fingerprint) != Some(current) {
        debug!(task = %handle, "inputs changed since last run");
        false
      } else {
        true
      }
    }
  };

  let last = record.map(|r| r.observed).unwrap_or_default();
  if outputs_current && action.is_up_to_date(&last).await.map_err(task_error)? {
    return Ok(Outcome::UpToDate);
  }

  info!(task = %handle, description = %spec.description, "running task");
  let observed = action.run().await.map_err(task_error)?;

  if let Some(fingerprint) = fingerprint {
    state.record(handle, &fingerprint, observed)?;
  }
  Ok(Outcome::Executed)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::task::Observations;
  use async_trait::async_trait;
  use std::sync::Mutex;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use tempfile::TempDir;

  /// A task with configurable behavior that logs when it runs.
  struct TestTask {
    handle: TaskHandle,
    depends_on: Vec<TaskHandle>,
    outputs: Vec<PathBuf>,
    up_to_date: bool,
    fail: bool,
    panic: bool,
    log: Arc<Mutex<Vec<String>>>,
    materialized: Arc<AtomicUsize>,
  }

  struct TestAction {
    name: String,
    outputs: Vec<PathBuf>,
    up_to_date: bool,
    fail: bool,
    panic: bool,
    log: Arc<Mutex<Vec<String>>>,
  }

  #[async_trait]
  impl TaskAction for TestAction {
    async fn is_up_to_date(&self, _last: &Observations) -> Result<bool, TaskError> {
      Ok(self.up_to_date)
    }

    async fn run(&self) -> Result<Observations, TaskError> {
      self.log.lock().unwrap().push(self.name.clone());
      if self.panic {
        panic!("{} blew up", self.name);
      }
      if self.fail {
        return Err(TaskError::CommandFailed {
          cmd: self.name.clone(),
          code: Some(1),
          stderr: String::new(),
        });
      }
      for output in &self.outputs {
        std::fs::write(output, "done").unwrap();
      }
      Ok(Observations::new())
    }
  }

  #[async_trait]
  impl LazyTask for TestTask {
    fn handle(&self) -> &TaskHandle {
      &self.handle
    }

    async fn materialize(&self) -> Result<TaskSpec, TaskError> {
      self.materialized.fetch_add(1, Ordering::SeqCst);
      Ok(TaskSpec {
        description: self.handle.to_string(),
        outputs: self.outputs.clone(),
        depends_on: self.depends_on.clone(),
        action: Some(Arc::new(TestAction {
          name: self.handle.to_string(),
          outputs: self.outputs.clone(),
          up_to_date: self.up_to_date,
          fail: self.fail,
          panic: self.panic,
          log: self.log.clone(),
        })),
        ..TaskSpec::default()
      })
    }
  }

  struct Fixture {
    temp: TempDir,
    scheduler: Scheduler,
    log: Arc<Mutex<Vec<String>>>,
    materialized: Arc<AtomicUsize>,
  }

  impl Fixture {
    fn new() -> Self {
      let temp = TempDir::new().unwrap();
      let scheduler = Scheduler::new(temp.path().join("tasks"), ExecuteConfig { parallelism: 2 });
      Self {
        temp,
        scheduler,
        log: Arc::new(Mutex::new(Vec::new())),
        materialized: Arc::new(AtomicUsize::new(0)),
      }
    }

    fn task(&self, name: &str) -> TestTask {
      TestTask {
        handle: TaskHandle::new(name),
        depends_on: vec![],
        outputs: vec![],
        up_to_date: false,
        fail: false,
        panic: false,
        log: self.log.clone(),
        materialized: self.materialized.clone(),
      }
    }

    fn add(&mut self, task: TestTask) -> TaskHandle {
      self.scheduler.register(Box::new(task)).unwrap()
    }

    fn ran(&self) -> Vec<String> {
      self.log.lock().unwrap().clone()
    }
  }

  fn handle(name: &str) -> TaskHandle {
    TaskHandle::new(name)
  }

  mod registration {
    use super::*;

    #[test]
    fn duplicate_registration_fails() {
      let mut f = Fixture::new();
      f.add(f.task("a"));

      let result = f.scheduler.register(Box::new(f.task("a")));
      assert!(matches!(result, Err(TaskError::Duplicate(_))));
    }

    #[test]
    fn lifecycle_is_created_once() {
      let mut f = Fixture::new();
      let first = f.scheduler.lifecycle("a:assemble");
      let second = f.scheduler.lifecycle("a:assemble");

      assert_eq!(first, second);
      assert_eq!(f.scheduler.handles(), vec![handle("a:assemble")]);
    }

    #[test]
    fn depend_on_unknown_task_fails() {
      let mut f = Fixture::new();
      let a = f.add(f.task("a"));

      let result = f.scheduler.depend(&a, &handle("missing"));
      assert!(matches!(result, Err(TaskError::Unknown(ref h)) if h.name() == "missing"));
    }
  }

  mod ordering {
    use super::*;

    #[tokio::test]
    async fn static_and_materialized_dependencies_run_first() {
      let mut f = Fixture::new();
      let assemble = f.scheduler.lifecycle("base:assemble");
      let base = f.add(f.task("base:build-image"));
      f.scheduler.depend(&assemble, &base).unwrap();
      let mut server = f.task("server:build-image");
      server.depends_on = vec![assemble.clone()];
      let server = f.add(server);

      let report = f.scheduler.run(&[server]).await.unwrap();

      assert_eq!(f.ran(), vec!["base:build-image", "server:build-image"]);
      assert_eq!(report.executed.len(), 2);
      assert_eq!(report.up_to_date, vec![assemble]);
    }

    #[tokio::test]
    async fn only_selected_tasks_are_materialized() {
      let mut f = Fixture::new();
      let a = f.add(f.task("a"));
      f.add(f.task("b"));

      f.scheduler.run(&[a]).await.unwrap();

      assert_eq!(f.materialized.load(Ordering::SeqCst), 1);
      assert_eq!(f.ran(), vec!["a"]);
    }

    #[tokio::test]
    async fn unknown_target_is_an_error() {
      let f = Fixture::new();
      let result = f.scheduler.run(&[handle("nope")]).await;
      assert!(matches!(result, Err(ExecuteError::UnknownTask(_))));
    }

    #[tokio::test]
    async fn cycle_is_an_error() {
      let mut f = Fixture::new();
      let mut a = f.task("a");
      a.depends_on = vec![handle("b")];
      let mut b = f.task("b");
      b.depends_on = vec![handle("a")];
      let a = f.add(a);
      f.add(b);

      let result = f.scheduler.run(&[a]).await;
      assert!(matches!(result, Err(ExecuteError::CycleDetected(_))));
      assert!(f.ran().is_empty());
    }
  }

  mod failures {
    use super::*;

    #[tokio::test]
    async fn dependents_of_failed_task_are_skipped() {
      let mut f = Fixture::new();
      let mut base = f.task("base");
      base.fail = true;
      let base = f.add(base);
      let mut server = f.task("server");
      server.depends_on = vec![base.clone()];
      let server = f.add(server);
      let other = f.add(f.task("other"));

      let report = f.scheduler.run(&[server.clone(), other.clone()]).await.unwrap();

      assert!(!report.is_success());
      assert!(report.failed.contains_key(&base));
      assert_eq!(report.skipped.get(&server), Some(&base));
      assert_eq!(report.executed, vec![other]);
    }

    #[tokio::test]
    async fn panicking_task_fails_and_skips_dependents() {
      let mut f = Fixture::new();
      let mut base = f.task("base");
      base.panic = true;
      let base = f.add(base);
      let mut server = f.task("server");
      server.depends_on = vec![base.clone()];
      let server = f.add(server);

      let report = f.scheduler.run(&[server.clone()]).await.unwrap();

      assert!(!report.is_success());
      assert_eq!(report.failed.get(&base).map(String::as_str), Some("base panicked"));
      assert_eq!(report.skipped.get(&server), Some(&base));
      assert!(report.executed.is_empty());
      assert_eq!(f.ran(), vec!["base"]);
    }
  }

  mod up_to_date {
    use super::*;

    #[tokio::test]
    async fn task_without_outputs_asks_its_action() {
      let mut f = Fixture::new();
      let mut a = f.task("a");
      a.up_to_date = true;
      let a = f.add(a);

      let report = f.scheduler.run(&[a.clone()]).await.unwrap();

      assert_eq!(report.up_to_date, vec![a]);
      assert!(f.ran().is_empty());
    }

    #[tokio::test]
    async fn second_run_skips_task_with_recorded_outputs() {
      let mut f = Fixture::new();
      let output = f.temp.path().join("a.out");
      let mut a = f.task("a");
      a.outputs = vec![output.clone()];
      a.up_to_date = true;
      let a = f.add(a);

      let first = f.scheduler.run(&[a.clone()]).await.unwrap();
      let second = f.scheduler.run(&[a.clone()]).await.unwrap();

      assert_eq!(first.executed, vec![a.clone()]);
      assert_eq!(second.up_to_date, vec![a]);
      assert_eq!(f.ran(), vec!["a"]);
    }

    #[tokio::test]
    async fn deleted_output_forces_rerun() {
      let mut f = Fixture::new();
      let output = f.temp.path().join("a.out");
      let mut a = f.task("a");
      a.outputs = vec![output.clone()];
      a.up_to_date = true;
      let a = f.add(a);

      f.scheduler.run(&[a.clone()]).await.unwrap();
      std::fs::remove_file(&output).unwrap();
      let second = f.scheduler.run(&[a.clone()]).await.unwrap();

      assert_eq!(second.executed, vec![a]);
      assert_eq!(f.ran(), vec!["a", "a"]);
    }

    #[tokio::test]
    async fn action_predicate_can_force_rerun() {
      let mut f = Fixture::new();
      let output = f.temp.path().join("a.out");
      let mut a = f.task("a");
      a.outputs = vec![output];
      a.up_to_date = false;
      let a = f.add(a);

      f.scheduler.run(&[a.clone()]).await.unwrap();
      f.scheduler.run(&[a]).await.unwrap();

      assert_eq!(f.ran(), vec!["a", "a"]);
    }
  }

  #[cfg(unix)]
  mod image_builds {
    use super::*;
    use crate::config::Config;
    use crate::context::GraphContext;
    use crate::image::OwnershipPolicy;
    use crate::project::Project;
    use crate::task::{ProjectTasks, TaskFactory};
    use crate::util::testutil::{FakeStore, write_file, write_script};

    /// A base image and a server built on it.
    fn repo() -> TempDir {
      let temp = TempDir::new().unwrap();
      write_file(temp.path(), "base/Dockerfile", "FROM ubuntu:20.04\n");
      write_file(temp.path(), "server/Dockerfile", "FROM airbyte/base:dev\n");
      temp
    }

    /// Declare both projects into a new scheduler, as one invocation would.
    fn declare(temp: &TempDir, store: &Arc<FakeStore>) -> (Scheduler, Vec<ProjectTasks>) {
      let mut config = Config::new(temp.path());
      config.build_script = write_script(temp.path(), "build.sh", r#"echo "sha256:$(basename "$2")" > "$5""#);
      let config = Arc::new(config);
      let context = Arc::new(GraphContext::new(store.clone(), OwnershipPolicy::default()));
      let factory = TaskFactory::new(context, config.clone());
      let mut scheduler = Scheduler::new(config.task_state_dir(), ExecuteConfig { parallelism: 2 });

      let tasks = ["base", "server"]
        .iter()
        .map(|dir| {
          let project = Project::new(temp.path(), temp.path().join(dir));
          factory.declare_project(&mut scheduler, &project).unwrap()
        })
        .collect();
      factory.validate().unwrap();
      (scheduler, tasks)
    }

    #[tokio::test]
    async fn unchanged_store_skips_every_build_on_second_run() {
      let temp = repo();
      let store = Arc::new(FakeStore::new(&[("airbyte/base:dev", "h1"), ("airbyte/server:dev", "s1")]));

      let (scheduler, tasks) = declare(&temp, &store);
      let first = scheduler.run(&[tasks[1].assemble.clone()]).await.unwrap();
      let (scheduler, tasks) = declare(&temp, &store);
      let second = scheduler.run(&[tasks[1].assemble.clone()]).await.unwrap();

      assert_eq!(
        first.executed,
        vec![handle("base:build-image"), handle("server:build-image")]
      );
      assert!(second.executed.is_empty());
    }

    #[tokio::test]
    async fn base_changed_between_runs_rebuilds_consumer() {
      let temp = repo();
      let store = Arc::new(FakeStore::new(&[("airbyte/base:dev", "h1"), ("airbyte/server:dev", "s1")]));

      let (scheduler, tasks) = declare(&temp, &store);
      scheduler.run(&[tasks[1].assemble.clone()]).await.unwrap();
      let recorded = scheduler.recorded(&handle("server:build-image")).unwrap();
      assert_eq!(recorded.observed.get("airbyte/base:dev").map(String::as_str), Some("h1"));

      store.set(&[("airbyte/base:dev", "h2"), ("airbyte/server:dev", "s1")]);
      let (scheduler, tasks) = declare(&temp, &store);
      let second = scheduler.run(&[tasks[1].assemble.clone()]).await.unwrap();

      assert_eq!(second.executed, vec![handle("server:build-image")]);
      assert!(second.up_to_date.contains(&handle("base:build-image")));
      let recorded = scheduler.recorded(&handle("server:build-image")).unwrap();
      assert_eq!(recorded.observed.get("airbyte/base:dev").map(String::as_str), Some("h2"));
    }
  }
}
