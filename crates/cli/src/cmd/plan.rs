//! Implementation of the `imgraph plan` command.
//!
//! Materializes every unit against the image store and reports, without
//! building anything, which images would be rebuilt and why. Units built
//! before are judged against the base hashes recorded after that build.

use std::path::Path;

use anyhow::{Context, Result};
use owo_colors::{OwoColorize, Stream};
use serde::Serialize;

use imagegraph_lib::image::HashSnapshot;
use imagegraph_lib::staleness::Verdict;
use imagegraph_lib::task::{BUILD_IMAGE, TaskHandle};

use super::Workspace;
use crate::output::{print_json, print_stat, symbols, truncate_hash};

#[derive(Serialize)]
struct PlanEntry {
  project: String,
  image: String,
  depends_on: Vec<String>,
  snapshot: HashSnapshot,
  /// Base hashes recorded after the last successful build.
  built_against: Option<HashSnapshot>,
  up_to_date: bool,
  verdict: Verdict,
}

pub fn cmd_plan(root: &Path, json: bool) -> Result<()> {
  let workspace = Workspace::load(root, None)?;
  let context = workspace.factory.context();
  let oracle = context.oracle();
  let order = workspace.graph.topological_order()?;

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let entries = rt.block_on(async {
    let mut entries = Vec::new();
    for decl in &order {
      let unit = context
        .materialize(decl)
        .await
        .with_context(|| format!("Failed to resolve {}", decl.project))?;
      let built_against = workspace
        .scheduler
        .recorded(&TaskHandle::for_step(&decl.project, BUILD_IMAGE))
        .map(|record| record.observed.into_iter().collect::<HashSnapshot>());
      let verdict = oracle
        .check_against(&unit, built_against.as_ref().unwrap_or(&unit.snapshot))
        .await
        .with_context(|| format!("Failed to check {}", decl.image))?;
      entries.push(PlanEntry {
        project: decl.project.clone(),
        image: decl.image.clone(),
        depends_on: unit.producers.iter().map(|p| p.image.clone()).collect(),
        snapshot: unit.snapshot,
        built_against,
        up_to_date: verdict.is_up_to_date(),
        verdict,
      });
    }
    Ok::<_, anyhow::Error>(entries)
  })?;

  if json {
    return print_json(&entries);
  }

  let mut stale = 0;
  for entry in &entries {
    if entry.up_to_date {
      println!(
        "{} {} {}",
        symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
        entry.image,
        "up to date".if_supports_color(Stream::Stdout, |s| s.dimmed())
      );
    } else {
      stale += 1;
      println!(
        "{} {} {}",
        symbols::STALE.if_supports_color(Stream::Stdout, |s| s.yellow()),
        entry.image,
        entry.verdict.if_supports_color(Stream::Stdout, |s| s.yellow())
      );
    }
    for (base, hash) in entry.snapshot.iter() {
      println!("    {} {}", base, truncate_hash(hash).if_supports_color(Stream::Stdout, |s| s.dimmed()));
    }
  }
  println!();
  print_stat("Images", &entries.len().to_string());
  print_stat("To build", &stale.to_string());
  Ok(())
}
