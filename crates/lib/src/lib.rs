//! imagegraph-lib: container image build units for a task graph
//!
//! This crate decides when a project's container image must be rebuilt and
//! which other images have to be built first:
//! - `buildfile`: base-image extraction from build files
//! - `image`: tagged names, hash snapshots and the ownership rules
//! - `store`: the external image store and the per-run hash registry
//! - `unit`: per-project build units and the image-name index
//! - `graph`: dependency resolution and the declared-unit pre-pass
//! - `context`: the registry and index shared by one graph evaluation
//! - `staleness`: the rebuild decision
//! - `task`: the task factory and the host interface it registers into
//! - `execute`: an in-process task host that runs the registered tasks

pub mod buildfile;
pub mod config;
pub mod consts;
pub mod context;
pub mod execute;
pub mod graph;
pub mod image;
pub mod project;
pub mod staleness;
pub mod store;
pub mod task;
pub mod unit;
pub mod util;
