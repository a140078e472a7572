//! Implementation of the `imgraph clean` command.

use std::path::Path;

use anyhow::Result;

use super::{Workspace, finish};

/// Run the `clean` step of the selected projects, deleting only their
/// identifier artifacts.
pub fn cmd_clean(root: &Path, projects: &[String], json: bool) -> Result<()> {
  let mut workspace = Workspace::load(root, None)?;
  let targets = workspace.select(projects, |tasks| &tasks.clean)?;
  let report = workspace.run(&targets)?;
  finish(&report, json)
}
