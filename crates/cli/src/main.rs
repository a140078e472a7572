mod cmd;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cmd::{cmd_build, cmd_clean, cmd_graph, cmd_plan};

/// imgraph - Container image build graph
#[derive(Parser)]
#[command(name = "imgraph")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Repository root to discover image projects under
  #[arg(long, global = true, env = "IMAGEGRAPH_ROOT", default_value = ".")]
  root: PathBuf,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Build the images of the given projects (all by default) and what they depend on
  Build {
    /// Project paths relative to the root
    projects: Vec<String>,

    /// Maximum number of tasks to run in parallel
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Output as JSON
    #[arg(long)]
    json: bool,
  },

  /// Show each image's dependencies and whether it would be rebuilt
  Plan {
    /// Output as JSON
    #[arg(long)]
    json: bool,
  },

  /// Print the validated build order
  Graph {
    /// Output as JSON
    #[arg(long)]
    json: bool,
  },

  /// Remove the identifier artifacts of the given projects (all by default)
  Clean {
    /// Project paths relative to the root
    projects: Vec<String>,

    /// Output as JSON
    #[arg(long)]
    json: bool,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "warn" };
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  match cli.command {
    Commands::Build { projects, jobs, json } => cmd_build(&cli.root, &projects, jobs, json),
    Commands::Plan { json } => cmd_plan(&cli.root, json),
    Commands::Graph { json } => cmd_graph(&cli.root, json),
    Commands::Clean { projects, json } => cmd_clean(&cli.root, &projects, json),
  }
}
