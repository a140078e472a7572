//! Recorded task fingerprints.
//!
//! After a task with outputs succeeds, a fingerprint of its properties and
//! input file contents is written to `<state-dir>/<hash-of-task-name>.json`,
//! together with the observations its action reported. The task is only
//! considered up to date while the fingerprint matches.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::types::ExecuteError;
use crate::task::{Observations, TaskHandle, TaskSpec};
use crate::util::hash::{ContentHash, hash_bytes, hash_file, short_hash};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
  pub task: String,
  pub fingerprint: ContentHash,
  #[serde(default)]
  pub observed: Observations,
}

#[derive(Debug, Clone)]
pub struct TaskStateStore {
  dir: PathBuf,
}

impl TaskStateStore {
  pub fn new(dir: impl Into<PathBuf>) -> Self {
    Self { dir: dir.into() }
  }

  fn path_for(&self, task: &TaskHandle) -> PathBuf {
    self.dir.join(format!("{}.json", short_hash(task.name().as_bytes())))
  }

  /// The record left by the last successful run of `task`, if any.
  ///
  /// An unreadable record is treated as absent so the task reruns.
  pub fn recorded(&self, task: &TaskHandle) -> Option<TaskRecord> {
    let path = self.path_for(task);
    let contents = std::fs::read_to_string(&path).ok()?;
    match serde_json::from_str::<TaskRecord>(&contents) {
      Ok(record) if record.task == task.name() => Some(record),
      Ok(_) => None,
      Err(e) => {
        warn!(path = %path.display(), error = %e, "ignoring corrupt task record");
        None
      }
    }
  }

  pub fn record(
    &self,
    task: &TaskHandle,
    fingerprint: &ContentHash,
    observed: Observations,
  ) -> Result<(), ExecuteError> {
    let path = self.path_for(task);
    let state_error = |message: String| ExecuteError::State {
      path: path.display().to_string(),
      message,
    };

    std::fs::create_dir_all(&self.dir).map_err(|e| state_error(e.to_string()))?;
    let record = TaskRecord {
      task: task.name().to_string(),
      fingerprint: fingerprint.clone(),
      observed,
    };
    let json = serde_json::to_string_pretty(&record).map_err(|e| state_error(e.to_string()))?;
    std::fs::write(&path, json).map_err(|e| state_error(e.to_string()))?;
    Ok(())
  }

  pub fn forget(&self, task: &TaskHandle) {
    let path = self.path_for(task);
    match std::fs::remove_file(&path) {
      Ok(()) => debug!(task = %task, "forgot task record"),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
      Err(e) => warn!(path = %path.display(), error = %e, "failed to remove task record"),
    }
  }
}

/// Hash of a task's properties, input file contents and output paths.
pub fn fingerprint(spec: &TaskSpec) -> Result<ContentHash, ExecuteError> {
  let mut lines = Vec::new();
  for (key, value) in &spec.properties {
    lines.push(format!("property {key}={value}"));
  }
  for input in &spec.inputs {
    lines.push(format!("input {} {}", input.display(), hash_file(input)?));
  }
  for output in &spec.outputs {
    lines.push(format!("output {}", output.display()));
  }
  Ok(hash_bytes(lines.join("\n").as_bytes()))
}
