//! Platform Adapter: a thin boundary over the container platform.
//!
//! Consolidates the teacher's multi-endpoint `Endpoint`/`EndpointScheduler`
//! pair (which load-balances across several Docker hosts) into a single
//! adapter, since spec.md's container platform is one Kubernetes API
//! server, not a pool to pick between (see DESIGN.md).

mod kube_adapter;

pub use kube_adapter::KubePlatform;

use futures::future::BoxFuture;
use k8s_openapi::api::batch::v1::Job;

/// Terminal/non-terminal status of a submitted child job.
///
/// Mapping rule (spec.md §4.5): `status.succeeded` set -> `Succeeded`;
/// else `status.failed` set -> `Failed`; else `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Succeeded,
    Failed,
}

/// Operations the scheduler needs from the container platform.
///
/// Status is polled on demand - there is no background watcher.
pub trait ContainerPlatform: Send + Sync {
    fn create_job<'a>(&'a self, job: &'a Job, namespace: &'a str) -> BoxFuture<'a, anyhow::Result<()>>;

    fn get_job_status<'a>(
        &'a self,
        job_name: &'a str,
        namespace: &'a str,
    ) -> BoxFuture<'a, anyhow::Result<JobStatus>>;
}

#[cfg(any(test, feature = "test-util"))]
pub mod testutil {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    /// A `ContainerPlatform` test double backed by an in-memory map from
    /// job name to status. Jobs default to `Running` until a test flips
    /// them with [`FakePlatform::set_status`], or until they reach a poll
    /// threshold registered with [`FakePlatform::resolve_next_job_after`] -
    /// which lets a test model "this child takes longer to finish than
    /// that one" without depending on wall-clock or virtual time.
    #[derive(Default)]
    pub struct FakePlatform {
        statuses: Mutex<HashMap<String, JobStatus>>,
        created: Mutex<Vec<String>>,
        fail_create: Mutex<bool>,
        pending_resolutions: Mutex<VecDeque<(u32, JobStatus)>>,
        assigned: Mutex<HashMap<String, (u32, JobStatus)>>,
        poll_counts: Mutex<HashMap<String, u32>>,
    }

    impl FakePlatform {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_status(&self, job_name: &str, status: JobStatus) {
            self.statuses
                .lock()
                .expect("lock poisoned")
                .insert(job_name.to_string(), status);
        }

        pub fn fail_create_job(&self, fail: bool) {
            *self.fail_create.lock().expect("lock poisoned") = fail;
        }

        pub fn created_jobs(&self) -> Vec<String> {
            self.created.lock().expect("lock poisoned").clone()
        }

        /// Assigns `outcome` to the *next* job created, once it has been
        /// polled `polls` times. Assignments are consumed in creation
        /// order, one per `create_job` call.
        pub fn resolve_next_job_after(&self, polls: u32, outcome: JobStatus) {
            self.pending_resolutions
                .lock()
                .expect("lock poisoned")
                .push_back((polls, outcome));
        }
    }

    impl ContainerPlatform for FakePlatform {
        fn create_job<'a>(&'a self, job: &'a Job, _namespace: &'a str) -> BoxFuture<'a, anyhow::Result<()>> {
            Box::pin(async move {
                if *self.fail_create.lock().expect("lock poisoned") {
                    anyhow::bail!("fake platform configured to fail job creation");
                }
                let name = job
                    .metadata
                    .name
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("job has no name"))?;
                self.created.lock().expect("lock poisoned").push(name.clone());
                self.statuses
                    .lock()
                    .expect("lock poisoned")
                    .entry(name.clone())
                    .or_insert(JobStatus::Running);
                if let Some(resolution) = self.pending_resolutions.lock().expect("lock poisoned").pop_front() {
                    self.assigned.lock().expect("lock poisoned").insert(name, resolution);
                }
                Ok(())
            })
        }

        fn get_job_status<'a>(
            &'a self,
            job_name: &'a str,
            _namespace: &'a str,
        ) -> BoxFuture<'a, anyhow::Result<JobStatus>> {
            Box::pin(async move {
                let count = {
                    let mut counts = self.poll_counts.lock().expect("lock poisoned");
                    let count = counts.entry(job_name.to_string()).or_insert(0);
                    *count += 1;
                    *count
                };

                if let Some((threshold, outcome)) =
                    self.assigned.lock().expect("lock poisoned").get(job_name)
                {
                    if count >= *threshold {
                        return Ok(*outcome);
                    }
                    return Ok(JobStatus::Running);
                }

                Ok(*self
                    .statuses
                    .lock()
                    .expect("lock poisoned")
                    .get(job_name)
                    .unwrap_or(&JobStatus::Running))
            })
        }
    }
}
