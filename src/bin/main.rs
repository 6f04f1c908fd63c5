//! Master binary: loads a scheduler configuration, connects to the
//! container platform, and drives a root task to completion.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use kannon::cli::MasterArgs;
use kannon::platform::KubePlatform;
use kannon::{SchedulerConfig, SchedulerSetup};

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let args = MasterArgs::parse();
    let config = SchedulerConfig::load(&args.config)
        .with_context(|| format!("loading configuration from {}", args.config.display()))?;

    tracing::info!(config = %args.config.display(), "loaded scheduler configuration");

    let platform = KubePlatform::connect()
        .await
        .context("connecting to the container platform")?;

    let scheduler = SchedulerSetup::builder()
        .config(config)
        .platform(Arc::new(platform))
        .build()
        .setup()
        .context("assembling scheduler")?;

    let root = load_root_task()?;
    scheduler.run(root).await?;

    Ok(())
}

/// Where the root task comes from is intentionally left to the caller
/// of this crate: a real deployment loads it the same way the child
/// does, via [`kannon::artifact::load_task`], from a path the caller
/// supplies. This reference binary reads it from `KANNON_ROOT_TASK_PATH`
/// so the crate is runnable end-to-end without embedding any one task
/// family's construction logic in the scheduler core.
fn load_root_task() -> anyhow::Result<Arc<dyn kannon::Task>> {
    let path = std::env::var("KANNON_ROOT_TASK_PATH")
        .context("KANNON_ROOT_TASK_PATH must name the root task artifact to run")?;
    let boxed = kannon::artifact::load_task(std::path::Path::new(&path))?;
    Ok(Arc::from(boxed))
}
