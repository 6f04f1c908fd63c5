//! Scheduler Loop: the orchestrator's heart. Pops tasks off a FIFO
//! queue, dispatches LOCAL tasks in-process and REMOTE tasks as child
//! jobs on the container platform, and re-enqueues anything not yet
//! finished until the queue drains.
//!
//! ```mermaid
//! graph TD
//!     A[pop front] --> B{is_complete?}
//!     B -- yes --> A
//!     B -- no --> C{awaiting own child?}
//!     C -- yes, FAILED --> X[abort]
//!     C -- yes, else --> Z[re-enqueue] --> A
//!     C -- no --> D[pacing sleep]
//!     D --> E{dependencies ready?}
//!     E -- no --> Z
//!     E -- yes --> F{placement}
//!     F -- Local --> G[run_local] --> A
//!     F -- Remote --> H{at max_child_jobs?}
//!     H -- yes --> Z
//!     H -- no --> I[stage + submit child job] --> Z
//! ```

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::batch::v1::Job;
use log::debug;
use log::trace;
use typed_builder::TypedBuilder;

use crate::artifact;
use crate::config::SchedulerConfig;
use crate::error::SchedulerError;
use crate::job::{self, ChildJobSpec, MasterPodRef};
use crate::platform::{ContainerPlatform, JobStatus};
use crate::task::{task_info, Placement, Task, TaskId};

const DEFAULT_PACING_INTERVAL: Duration = Duration::from_secs(1);

/// Inputs needed to assemble a [`Scheduler`]. Mirrors the teacher's
/// `OrchestratorSetup` - a one-shot builder that resolves environment
/// and on-disk state once, up front, so [`Scheduler::run`] itself never
/// has to fail on missing configuration.
#[derive(TypedBuilder)]
pub struct SchedulerSetup {
    config: SchedulerConfig,
    platform: Arc<dyn ContainerPlatform>,
    #[builder(default = DEFAULT_PACING_INTERVAL)]
    pacing_interval: Duration,
}

impl SchedulerSetup {
    /// Resolves `TASK_WORKSPACE_DIRECTORY` and loads the template job
    /// from disk, producing a [`Scheduler`] ready to run a DAG.
    pub fn setup(self) -> anyhow::Result<Scheduler> {
        let workspace = std::env::var("TASK_WORKSPACE_DIRECTORY")
            .map_err(|_| SchedulerError::MissingWorkspaceEnvVar)?;
        let workspace = PathBuf::from(workspace);
        let template_job = load_template_job(self.config.template_job_path())?;

        Ok(Scheduler {
            config: self.config,
            template_job,
            platform: self.platform,
            workspace,
            pacing_interval: self.pacing_interval,
        })
    }
}

fn load_template_job(path: &Path) -> anyhow::Result<Job> {
    let bytes = std::fs::read(path)?;
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => Ok(serde_json::from_slice(&bytes)?),
        _ => Ok(serde_yaml::from_slice(&bytes)?),
    }
}

/// A single run of the scheduler loop over one DAG.
pub struct Scheduler {
    config: SchedulerConfig,
    template_job: Job,
    platform: Arc<dyn ContainerPlatform>,
    workspace: PathBuf,
    pacing_interval: Duration,
}

impl Scheduler {
    /// Drive `root` and its transitive dependencies to completion.
    ///
    /// Returns once every reachable task is complete. Any FAILED child
    /// job, anywhere in the DAG, aborts the whole run fatally (spec.md
    /// §4.2/§4.3) - there is no partial-failure tolerance.
    pub async fn run(&self, root: Arc<dyn Task>) -> anyhow::Result<()> {
        let remote_config_path = self.stage_dynamic_config()?;

        tracing::info!("Creating task queue...");
        let mut queue = crate::graph::materialize(root);
        tracing::info!(total = queue.len(), "Total tasks in task queue");

        let mut job_names: HashMap<TaskId, String> = HashMap::new();
        let mut running: HashSet<TaskId> = HashSet::new();

        tracing::info!("Consuming task queue...");
        debug!("Entering scheduling loop with {} tasks queued", queue.len());
        while let Some(task) = queue.pop_front() {
            // Yield once per iteration so a tight "awaiting own child"
            // cycle never starves the platform's own I/O (or, in tests,
            // a concurrently spawned task simulating that I/O).
            tokio::task::yield_now().await;

            let info = task_info(task.as_ref());

            if task.is_complete() {
                tracing::info!(task = %info, "task is already complete");
                running.remove(&task.id());
                continue;
            }

            if let Some(job_name) = job_names.get(&task.id()).cloned() {
                let status = self
                    .platform
                    .get_job_status(&job_name, self.config.namespace())
                    .await
                    .map_err(|source| SchedulerError::Platform {
                        action: format!("polling job {job_name}"),
                        source,
                    })?;
                if status == JobStatus::Failed {
                    return Err(SchedulerError::ChildJobFailed {
                        task: task.id(),
                        job_name,
                    }
                    .into());
                }
                tracing::info!(task = %info, job = %job_name, "task is still running on child job");
                queue.push_back(task);
                continue;
            }

            tokio::time::sleep(self.pacing_interval).await;

            if !self.is_ready(&task, &job_names).await? {
                tracing::debug!(task = %info, "task is not yet ready, re-enqueueing");
                queue.push_back(task);
                continue;
            }

            match task.placement() {
                Placement::Local => {
                    tracing::info!(task = %info, "executing task on master");
                    let runnable = task.clone();
                    tokio::task::spawn_blocking(move || runnable.run_local())
                        .await
                        .map_err(|join_err| anyhow::anyhow!("local task panicked: {join_err}"))?
                        .map_err(|source| SchedulerError::LocalExecutionFailed {
                            task: task.id(),
                            source,
                        })?;
                    tracing::info!(task = %info, "completed task on master");
                }
                Placement::Remote => {
                    if let Some(cap) = self.config.max_child_jobs() {
                        if running.len() >= cap.get() {
                            tracing::info!(task = %info, "reach max_child_jobs, waiting to run task on child job");
                            queue.push_back(task);
                            continue;
                        }
                    }

                    tracing::info!(task = %info, "trying to run task on child job");
                    let pkl_path = artifact::stage_task(&self.workspace, task.as_ref())?;
                    let spec = self.build_job(&pkl_path, remote_config_path.as_deref())?;

                    self.platform
                        .create_job(spec.job(), self.config.namespace())
                        .await
                        .map_err(|source| SchedulerError::Platform {
                            action: format!("creating job {}", spec.name()),
                            source,
                        })?;
                    tracing::info!(task = %info, job = %spec.name(), "created child job");

                    job_names.insert(task.id(), spec.name().clone());
                    running.insert(task.id());
                    queue.push_back(task);
                }
            }
        }

        tracing::info!("All tasks completed!");
        Ok(())
    }

    /// A task is ready once every dependency is complete, and - for any
    /// dependency that was itself dispatched as a child job - that
    /// job's status is no longer `Running`. A `Failed` dependency job
    /// aborts the run fatally (spec.md §4.3).
    async fn is_ready(&self, task: &Arc<dyn Task>, job_names: &HashMap<TaskId, String>) -> anyhow::Result<bool> {
        for dep in task.dependencies() {
            trace!("[{}]: checking dependency {}", task.id(), dep.id());
            if !dep.is_complete() {
                return Ok(false);
            }

            if let Some(job_name) = job_names.get(&dep.id()) {
                let status = self
                    .platform
                    .get_job_status(job_name, self.config.namespace())
                    .await
                    .map_err(|source| SchedulerError::Platform {
                        action: format!("polling dependency job {job_name}"),
                        source,
                    })?;
                match status {
                    JobStatus::Failed => {
                        return Err(SchedulerError::ChildJobFailed {
                            task: dep.id(),
                            job_name: job_name.clone(),
                        }
                        .into());
                    }
                    JobStatus::Running => return Ok(false),
                    JobStatus::Succeeded => {}
                }
            }
        }
        Ok(true)
    }

    fn stage_dynamic_config(&self) -> anyhow::Result<Option<PathBuf>> {
        match self.config.dynamic_config_path() {
            None => {
                tracing::info!("No dynamic config files to stage");
                Ok(None)
            }
            Some(path) => {
                tracing::info!(path = %path.display(), "staging dynamic config file");
                Ok(Some(artifact::stage_dynamic_config(&self.workspace, path)?))
            }
        }
    }

    fn build_job(&self, pkl_path: &Path, remote_config_path: Option<&Path>) -> anyhow::Result<ChildJobSpec> {
        let master_pod = self
            .config
            .master_pod()
            .map(|(name, uid)| MasterPodRef::new(name, uid));

        job::build_child_job(job::ChildJobInputs {
            template: &self.template_job,
            job_prefix: self.config.job_prefix(),
            interpreter: self.config.interpreter(),
            child_script_path: self.config.path_child_script(),
            task_pkl_path: pkl_path,
            remote_config_path,
            env_to_inherit: self.config.env_to_inherit(),
            master_pod,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::testutil::FakePlatform;
    use crate::task::testutil::FakeTask;
    use k8s_openapi::api::batch::v1::JobSpec;
    use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::num::NonZeroUsize;
    use tempfile::tempdir;

    fn template_job() -> Job {
        Job {
            metadata: ObjectMeta::default(),
            spec: Some(JobSpec {
                template: PodTemplateSpec {
                    metadata: None,
                    spec: Some(PodSpec {
                        containers: vec![Container {
                            name: "main".to_string(),
                            image: Some("example/image:latest".to_string()),
                            ..Default::default()
                        }],
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            status: None,
        }
    }

    fn write_template(dir: &Path) -> PathBuf {
        let path = dir.join("template.json");
        std::fs::write(&path, serde_json::to_vec(&template_job()).unwrap()).unwrap();
        path
    }

    fn test_scheduler(
        workspace: &Path,
        template_path: PathBuf,
        platform: Arc<dyn ContainerPlatform>,
        max_child_jobs: Option<usize>,
    ) -> Scheduler {
        std::env::set_var("TASK_WORKSPACE_DIRECTORY", workspace);
        let config = SchedulerConfig::builder()
            .template_job_path(template_path)
            .job_prefix("kannon-test".to_string())
            .path_child_script(workspace.join("run_child.py"))
            .env_to_inherit(vec!["TASK_WORKSPACE_DIRECTORY".to_string()])
            .master_pod_name(None)
            .master_pod_uid(None)
            .dynamic_config_path(None)
            .max_child_jobs(max_child_jobs.map(|n| NonZeroUsize::new(n).unwrap()))
            .namespace("default".to_string())
            .interpreter("python".to_string())
            .build();
        SchedulerSetup::builder()
            .config(config)
            .platform(platform)
            .pacing_interval(Duration::from_millis(1))
            .build()
            .setup()
            .unwrap()
    }

    /// S1: a single LOCAL task runs in-process exactly once.
    #[tokio::test]
    async fn single_local_task_runs_in_process() {
        let workspace = tempdir().unwrap();
        let template_path = write_template(workspace.path());
        let platform: Arc<dyn ContainerPlatform> = Arc::new(FakePlatform::new());
        let scheduler = test_scheduler(workspace.path(), template_path, platform, None);

        let (task, handle) = FakeTask::with_handle("leaf", Placement::Local, vec![]);
        scheduler.run(task).await.unwrap();

        assert_eq!(handle.run_count(), 1);
    }

    /// S2: a single REMOTE task is submitted once and the run completes
    /// once the platform reports it succeeded.
    #[tokio::test]
    async fn single_remote_task_dispatches_and_completes() {
        let workspace = tempdir().unwrap();
        let template_path = write_template(workspace.path());
        let fake_platform = Arc::new(FakePlatform::new());
        fake_platform.resolve_next_job_after(2, JobStatus::Succeeded);
        let platform: Arc<dyn ContainerPlatform> = fake_platform.clone();
        let scheduler = test_scheduler(workspace.path(), template_path, platform, None);

        let (task, handle) = FakeTask::with_handle("remote-leaf", Placement::Remote, vec![]);
        // The fake platform never flips completeness on its own; the
        // scheduler relies on the real child process doing that via
        // shared storage. Simulate this by marking the task complete
        // directly, mirroring what the child side would do, once the
        // job is created.
        let watcher_platform = fake_platform.clone();
        let watcher_handle = handle.clone();
        tokio::spawn(async move {
            loop {
                if !watcher_platform.created_jobs().is_empty() {
                    watcher_handle.mark_complete();
                    break;
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        });

        scheduler.run(task).await.unwrap();
        assert_eq!(handle.run_count(), 0);
        assert_eq!(fake_platform.created_jobs().len(), 1);
    }

    /// S5: a FAILED child job aborts the whole run.
    #[tokio::test]
    async fn failed_child_job_aborts_the_run() {
        let workspace = tempdir().unwrap();
        let template_path = write_template(workspace.path());
        let fake_platform = Arc::new(FakePlatform::new());
        fake_platform.resolve_next_job_after(1, JobStatus::Failed);
        let platform: Arc<dyn ContainerPlatform> = fake_platform;
        let scheduler = test_scheduler(workspace.path(), template_path, platform, None);

        let (task, _handle) = FakeTask::with_handle("doomed", Placement::Remote, vec![]);
        let err = scheduler.run(task).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SchedulerError>(),
            Some(SchedulerError::ChildJobFailed { .. })
        ));
    }

    /// S6: a diamond dependency (shared ancestor) is only ever run once,
    /// and the join node only runs after both of its parents finish.
    #[tokio::test]
    async fn diamond_dependency_runs_shared_ancestor_once() {
        let workspace = tempdir().unwrap();
        let template_path = write_template(workspace.path());
        let platform: Arc<dyn ContainerPlatform> = Arc::new(FakePlatform::new());
        let scheduler = test_scheduler(workspace.path(), template_path, platform, None);

        let (d, d_handle) = FakeTask::with_handle("d", Placement::Local, vec![]);
        let l = FakeTask::new("l", vec![d.clone()]);
        let r = FakeTask::new("r", vec![d.clone()]);
        let (j, _j_handle) = FakeTask::with_handle("j", Placement::Local, vec![l.clone(), r.clone()]);

        scheduler.run(j).await.unwrap();
        assert_eq!(d_handle.run_count(), 1);
    }

    /// Enforces the concurrency cap: with `max_child_jobs = 1`, a second
    /// REMOTE task is not dispatched until the first's job has resolved.
    #[tokio::test]
    async fn max_child_jobs_cap_is_enforced() {
        let workspace = tempdir().unwrap();
        let template_path = write_template(workspace.path());
        let fake_platform = Arc::new(FakePlatform::new());
        fake_platform.resolve_next_job_after(3, JobStatus::Succeeded);
        fake_platform.resolve_next_job_after(1, JobStatus::Succeeded);
        let platform: Arc<dyn ContainerPlatform> = fake_platform.clone();
        let scheduler = test_scheduler(workspace.path(), template_path, platform, Some(1));

        let (c1, c1_handle) = FakeTask::with_handle("c1", Placement::Remote, vec![]);
        let (c2, c2_handle) = FakeTask::with_handle("c2", Placement::Remote, vec![]);
        let (root, _root_handle) = FakeTask::with_handle("root", Placement::Local, vec![c1.clone(), c2.clone()]);

        let watcher_platform = fake_platform.clone();
        let watcher_c1 = c1_handle.clone();
        let watcher_c2 = c2_handle.clone();
        tokio::spawn(async move {
            loop {
                let created = watcher_platform.created_jobs();
                if created.len() >= 1 {
                    watcher_c1.mark_complete();
                }
                if created.len() >= 2 {
                    watcher_c2.mark_complete();
                }
                if created.len() >= 2 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        });

        scheduler.run(root).await.unwrap();
        assert_eq!(fake_platform.created_jobs().len(), 2);
    }

    /// S3: a LOCAL parent with three REMOTE children runs exactly once,
    /// strictly after all three children are observed complete.
    #[tokio::test]
    async fn fan_in_parent_runs_once_after_all_children_complete() {
        let workspace = tempdir().unwrap();
        let template_path = write_template(workspace.path());
        let fake_platform = Arc::new(FakePlatform::new());
        let platform: Arc<dyn ContainerPlatform> = fake_platform.clone();
        let scheduler = test_scheduler(workspace.path(), template_path, platform, None);

        let (c1, c1_handle) = FakeTask::with_handle("c1", Placement::Remote, vec![]);
        let (c2, c2_handle) = FakeTask::with_handle("c2", Placement::Remote, vec![]);
        let (c3, c3_handle) = FakeTask::with_handle("c3", Placement::Remote, vec![]);
        let (parent, parent_handle) = FakeTask::with_handle(
            "parent",
            Placement::Local,
            vec![c1.clone(), c2.clone(), c3.clone()],
        );

        // Drive completion order deterministically: once all three
        // children have a child job, flip their jobs to Succeeded (so
        // the readiness check's "dependency job not Running" condition
        // is satisfied) and then mark c3, then c2, then c1 complete in
        // turn - mirrors S3's wait times (4s/3s/2s) without depending
        // on real or virtual time.
        let watcher_platform = fake_platform.clone();
        let c1_bg = c1_handle.clone();
        let c2_bg = c2_handle.clone();
        let c3_bg = c3_handle.clone();
        tokio::spawn(async move {
            let created = loop {
                let created = watcher_platform.created_jobs();
                if created.len() >= 3 {
                    break created;
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
            };
            for name in &created {
                watcher_platform.set_status(name, JobStatus::Succeeded);
            }
            c3_bg.mark_complete();
            tokio::time::sleep(Duration::from_millis(2)).await;
            c2_bg.mark_complete();
            tokio::time::sleep(Duration::from_millis(2)).await;
            c1_bg.mark_complete();
        });

        scheduler.run(parent).await.unwrap();

        assert_eq!(parent_handle.run_count(), 1);
        assert_eq!(c1_handle.run_count(), 0);
        assert_eq!(c2_handle.run_count(), 0);
    }
}
