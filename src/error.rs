//! Typed error surface for the scheduler core.
//!
//! Every fatal error kind from the design is a distinct variant so call
//! sites and tests can match on *what* failed, not just the rendered
//! message. Call sites still propagate these through `anyhow::Result`,
//! the way the rest of this crate does.

use std::path::PathBuf;

use thiserror::Error;

use crate::task::TaskId;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("child script {0} does not exist")]
    ChildScriptMissing(PathBuf),

    #[error("max_child_jobs must be a positive integer, got {0}")]
    InvalidChildJobCap(i64),

    #[error("template job's primary container already has a command set; kannon owns the command")]
    TemplateHasCommand,

    #[error("template job has no container to attach a command to")]
    TemplateHasNoContainer,

    #[error("environment variable {0} must be set in the master environment to be inherited by child jobs")]
    MissingInheritedEnvVar(String),

    #[error("dynamic config file {0} is not a .ini file")]
    UnsupportedConfigFormat(PathBuf),

    #[error("TASK_WORKSPACE_DIRECTORY is not set in the master environment")]
    MissingWorkspaceEnvVar,

    #[error("task {0} has a placement that is neither Local nor Remote")]
    UnknownPlacement(TaskId),

    #[error("task {task} failed during local execution: {source}")]
    LocalExecutionFailed {
        task: TaskId,
        #[source]
        source: anyhow::Error,
    },

    #[error("task {task} on child job {job_name} has failed")]
    ChildJobFailed { task: TaskId, job_name: String },

    #[error("platform error while {action}: {source}")]
    Platform {
        action: String,
        #[source]
        source: anyhow::Error,
    },
}
