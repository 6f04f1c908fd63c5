//! Command-line surface for the master and child binaries.

use std::path::PathBuf;

use clap::Parser;

/// DAG-aware batch orchestrator: runs a task and its dependencies,
/// locally or on a container platform, according to a scheduler
/// configuration file.
#[derive(Debug, Parser)]
#[command(name = "kannon", author, version, about)]
pub struct MasterArgs {
    /// Path to the scheduler's TOML configuration file.
    #[arg(short, long)]
    pub config: PathBuf,
}

/// Reference child-side runner: loads one staged task and runs it.
///
/// This is the external collaborator spec.md §1(e) describes; nothing
/// about the scheduler core depends on this binary specifically, any
/// process honoring the same `--task-pkl-path`/`--remote-config-path`
/// contract will do.
#[derive(Debug, Parser)]
#[command(name = "kannon-child", author, version, about)]
pub struct ChildArgs {
    /// Path to the task artifact staged by the master (spec.md §4.6).
    #[arg(long)]
    pub task_pkl_path: PathBuf,

    /// Path to the dynamic config file staged alongside it, if any.
    #[arg(long)]
    pub remote_config_path: Option<PathBuf>,
}
