use futures::future::BoxFuture;
use k8s_openapi::api::batch::v1::Job;
use kube::api::PostParams;
use kube::{Api, Client};

use crate::platform::{ContainerPlatform, JobStatus};

/// `ContainerPlatform` backed by a real Kubernetes API server.
pub struct KubePlatform {
    client: Client,
}

impl KubePlatform {
    pub async fn connect() -> anyhow::Result<Self> {
        let client = Client::try_default().await?;
        Ok(Self { client })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

impl ContainerPlatform for KubePlatform {
    fn create_job<'a>(&'a self, job: &'a Job, namespace: &'a str) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            let api: Api<Job> = Api::namespaced(self.client.clone(), namespace);
            let created = api.create(&PostParams::default(), job).await?;
            tracing::debug!(job = ?created.metadata.name, "job created");
            Ok(())
        })
    }

    fn get_job_status<'a>(
        &'a self,
        job_name: &'a str,
        namespace: &'a str,
    ) -> BoxFuture<'a, anyhow::Result<JobStatus>> {
        Box::pin(async move {
            let api: Api<Job> = Api::namespaced(self.client.clone(), namespace);
            let job = api.get_status(job_name).await?;
            let status = job.status.unwrap_or_default();

            let result = if status.succeeded.is_some() {
                JobStatus::Succeeded
            } else if status.failed.is_some() {
                JobStatus::Failed
            } else {
                JobStatus::Running
            };
            Ok(result)
        })
    }
}
