//! Implementation of the `imgraph graph` command.
//!
//! Prints every image unit in build order with its direct dependencies. Does
//! not query the image store.

use std::path::{Path, PathBuf};

use anyhow::Result;
use owo_colors::{OwoColorize, Stream};
use serde::Serialize;

use super::Workspace;
use crate::output::{print_json, print_stat, symbols};

#[derive(Serialize)]
struct GraphEntry {
  project: String,
  image: String,
  build_file: PathBuf,
  artifact: PathBuf,
  depends_on: Vec<String>,
}

pub fn cmd_graph(root: &Path, json: bool) -> Result<()> {
  let workspace = Workspace::load(root, None)?;
  let graph = &workspace.graph;

  let entries: Vec<GraphEntry> = graph
    .topological_order()?
    .into_iter()
    .map(|unit| GraphEntry {
      depends_on: graph.dependencies(&unit.image).into_iter().map(|d| d.image.clone()).collect(),
      project: unit.project.clone(),
      image: unit.image.clone(),
      build_file: unit.build_file.clone(),
      artifact: unit.artifact.clone(),
    })
    .collect();

  if json {
    return print_json(&entries);
  }

  for entry in &entries {
    println!(
      "{} {}",
      entry.image.if_supports_color(Stream::Stdout, |s| s.bold()),
      format!("({})", entry.project).if_supports_color(Stream::Stdout, |s| s.dimmed())
    );
    for dep in &entry.depends_on {
      println!("  {} {}", symbols::ARROW, dep);
    }
  }
  println!();
  print_stat("Images", &graph.unit_count().to_string());
  print_stat("Edges", &graph.edge_count().to_string());
  Ok(())
}
