//! Implementation of the `imgraph build` command.
//!
//! Runs the `assemble` step of the selected projects. Producers of their base
//! images are built first; images that are up to date are skipped.

use std::path::Path;
use std::time::Instant;

use anyhow::Result;

use super::{Workspace, finish};
use crate::output::{format_duration, print_info};

pub fn cmd_build(root: &Path, projects: &[String], jobs: Option<usize>, json: bool) -> Result<()> {
  let mut workspace = Workspace::load(root, jobs)?;
  let targets = workspace.select(projects, |tasks| &tasks.assemble)?;

  if !json {
    print_info(&format!(
      "Building {} project(s) in {}",
      targets.len(),
      workspace.config.root.display()
    ));
  }

  let started = Instant::now();
  let report = workspace.run(&targets)?;

  if !json {
    print_info(&format!("Finished in {}", format_duration(started.elapsed())));
  }
  finish(&report, json)
}
