//! Reference child-side runner (spec.md §1(e)): loads the task staged
//! by the master and runs it. A thin binary - the scheduler core never
//! calls into this process directly, it only waits on the job the
//! container platform wraps around it.

use anyhow::Context;
use clap::Parser;

use kannon::artifact;
use kannon::cli::ChildArgs;

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}

fn main() -> anyhow::Result<()> {
    init_logging();

    let args = ChildArgs::parse();

    if args.remote_config_path.is_some() {
        let workspace = std::env::var("TASK_WORKSPACE_DIRECTORY")
            .context("TASK_WORKSPACE_DIRECTORY must be set in the child environment")?;
        let staged =
            artifact::stage_conf_dir_locally(std::path::Path::new(&workspace), std::path::Path::new("conf"))?;
        tracing::debug!(count = staged.len(), "staged dynamic config files locally");
    }

    let task = artifact::load_task(&args.task_pkl_path)
        .with_context(|| format!("loading task from {}", args.task_pkl_path.display()))?;

    tracing::info!(task = %kannon::task::task_info(task.as_ref()), "running task");
    task.run_local()
        .with_context(|| format!("running task {}", kannon::task::task_info(task.as_ref())))?;

    Ok(())
}
