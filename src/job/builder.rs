//! Child Job Builder: builds a per-task child job specification by
//! cloning a user-supplied template job, injecting the command line,
//! inherited environment variables, and an optional owner reference.

use std::path::Path;

use getset::{CopyGetters, Getters};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::EnvVar;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use log::debug;
use log::trace;

use crate::error::SchedulerError;
use crate::job::name::gen_job_name;

/// Identity of the master pod, used to wire an owner reference so the
/// platform garbage-collects children when the master pod disappears.
#[derive(Debug, Clone, Copy, CopyGetters)]
pub struct MasterPodRef<'a> {
    #[getset(get_copy = "pub")]
    name: &'a str,
    #[getset(get_copy = "pub")]
    uid: &'a str,
}

impl<'a> MasterPodRef<'a> {
    pub fn new(name: &'a str, uid: &'a str) -> Self {
        Self { name, uid }
    }
}

pub struct ChildJobInputs<'a> {
    pub template: &'a Job,
    pub job_prefix: &'a str,
    pub interpreter: &'a str,
    pub child_script_path: &'a Path,
    pub task_pkl_path: &'a Path,
    pub remote_config_path: Option<&'a Path>,
    pub env_to_inherit: &'a [String],
    pub master_pod: Option<MasterPodRef<'a>>,
}

/// Result of building one task's child job. Mirrors the teacher's
/// `Endpoint`-style "validated object, accessors not fields" shape.
#[derive(Getters)]
pub struct ChildJobSpec {
    #[getset(get = "pub")]
    job: Job,
    #[getset(get = "pub")]
    name: String,
}

/// Build a concrete, submittable job specification for one task.
///
/// Fails with [`SchedulerError::TemplateHasCommand`] if the template's
/// primary container already has a command set (kannon owns the
/// command), or [`SchedulerError::MissingInheritedEnvVar`] if an
/// inherited variable is not set in the master's own environment.
pub fn build_child_job(inputs: ChildJobInputs<'_>) -> anyhow::Result<ChildJobSpec> {
    trace!("Building child job from template for prefix {}", inputs.job_prefix);
    let mut job = inputs.template.clone();

    let pod_spec = job
        .spec
        .as_mut()
        .and_then(|spec| spec.template.spec.as_mut())
        .ok_or(SchedulerError::TemplateHasNoContainer)?;

    let container = pod_spec
        .containers
        .get_mut(0)
        .ok_or(SchedulerError::TemplateHasNoContainer)?;

    if container.command.is_some() {
        return Err(SchedulerError::TemplateHasCommand.into());
    }

    let mut command = vec![
        inputs.interpreter.to_string(),
        inputs.child_script_path.display().to_string(),
        "--task-pkl-path".to_string(),
        format!("'{}'", inputs.task_pkl_path.display()),
    ];
    if let Some(remote_config_path) = inputs.remote_config_path {
        command.push("--remote-config-path".to_string());
        command.push(remote_config_path.display().to_string());
    }
    container.command = Some(command);

    let mut env_list = container.env.take().unwrap_or_default();
    for name in inputs.env_to_inherit {
        let value = std::env::var(name)
            .map_err(|_| SchedulerError::MissingInheritedEnvVar(name.clone()))?;
        env_list.push(EnvVar {
            name: name.clone(),
            value: Some(value),
            value_from: None,
        });
    }
    container.env = Some(env_list);

    let job_name = gen_job_name(inputs.job_prefix);
    debug!("Built job name {job_name}");
    job.metadata.name = Some(job_name.clone());

    match inputs.master_pod {
        Some(master_pod) => {
            let owner_reference = OwnerReference {
                api_version: "batch/v1".to_string(),
                kind: "Pod".to_string(),
                name: master_pod.name().to_string(),
                uid: master_pod.uid().to_string(),
                controller: None,
                block_owner_deletion: None,
            };
            job.metadata
                .owner_references
                .get_or_insert_with(Vec::new)
                .push(owner_reference);
        }
        None => {
            tracing::warn!("owner reference not set: master pod identity was not provided");
        }
    }

    Ok(ChildJobSpec { job, name: job_name })
}
