//! Types for task execution.
//!
//! This module defines the error type, the run report, and the configuration
//! for running registered tasks.

use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;

use crate::task::{TaskError, TaskHandle};
use crate::util::hash::HashError;

/// Errors that can occur while running tasks.
#[derive(Debug, Error)]
pub enum ExecuteError {
  /// A target or dependency names a task that was never registered.
  #[error("unknown task: {0}")]
  UnknownTask(TaskHandle),

  /// Materializing a task failed. Aborts the run before anything executes.
  #[error("failed to configure {task}: {source}")]
  Materialize {
    task: TaskHandle,
    #[source]
    source: TaskError,
  },

  /// Cycle detected in the task graph.
  #[error("dependency cycle detected at {0}")]
  CycleDetected(TaskHandle),

  /// A task's up-to-date check or action failed.
  #[error("{task} failed: {source}")]
  Task {
    task: TaskHandle,
    #[source]
    source: TaskError,
  },

  /// A task's future panicked instead of returning.
  #[error("{0} panicked")]
  Panicked(TaskHandle),

  /// An input file could not be hashed.
  #[error("fingerprint error: {0}")]
  Fingerprint(#[from] HashError),

  /// Reading or writing recorded task state failed.
  #[error("task state error at {path}: {message}")]
  State { path: String, message: String },
}

/// What happened to each task of a run.
#[derive(Debug, Default, Serialize)]
pub struct RunReport {
  /// Tasks whose action ran and succeeded.
  pub executed: Vec<TaskHandle>,

  /// Tasks that had nothing to do.
  pub up_to_date: Vec<TaskHandle>,

  /// Tasks that failed, with the error message.
  pub failed: BTreeMap<TaskHandle, String>,

  /// Tasks not attempted because a dependency failed.
  /// Maps skipped task -> the failed dependency.
  pub skipped: BTreeMap<TaskHandle, TaskHandle>,
}

impl RunReport {
  /// Returns true if no task failed or was skipped.
  pub fn is_success(&self) -> bool {
    self.failed.is_empty() && self.skipped.is_empty()
  }

  /// Returns the total number of tasks processed.
  pub fn total(&self) -> usize {
    self.executed.len() + self.up_to_date.len() + self.failed.len() + self.skipped.len()
  }

  pub(crate) fn sort(&mut self) {
    self.executed.sort();
    self.up_to_date.sort();
  }
}

/// Configuration for task execution.
#[derive(Debug, Clone)]
pub struct ExecuteConfig {
  /// Maximum number of tasks to execute in parallel.
  pub parallelism: usize,
}

impl Default for ExecuteConfig {
  fn default() -> Self {
    Self {
      parallelism: num_cpus(),
    }
  }
}

/// Get the number of CPUs for default parallelism.
fn num_cpus() -> usize {
  std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
}
