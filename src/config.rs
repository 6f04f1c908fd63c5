//! Configuration of the orchestrator (spec.md §6).
//!
//! Loaded from a TOML file via the `config` crate, the way the teacher
//! repo depends on it (`config = { features = ["toml"] }`), then
//! validated once at construction time - everything that can fail
//! fatally before the scheduler loop even starts is caught here.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use getset::{CopyGetters, Getters};
use serde::Deserialize;
use typed_builder::TypedBuilder;

use crate::error::SchedulerError;

/// Raw, deserialized shape of the TOML configuration file.
#[derive(Debug, Deserialize)]
struct RawConfig {
    template_job_path: PathBuf,
    job_prefix: String,
    path_child_script: PathBuf,
    #[serde(default = "default_env_to_inherit")]
    env_to_inherit: Vec<String>,
    master_pod_name: Option<String>,
    master_pod_uid: Option<String>,
    dynamic_config_path: Option<PathBuf>,
    max_child_jobs: Option<i64>,
    #[serde(default = "default_namespace")]
    namespace: String,
    #[serde(default = "default_interpreter")]
    interpreter: String,
}

fn default_env_to_inherit() -> Vec<String> {
    vec!["TASK_WORKSPACE_DIRECTORY".to_string()]
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_interpreter() -> String {
    "python".to_string()
}

/// Validated configuration of one scheduler run.
///
/// Mirrors the teacher's `Endpoint` (`endpoint/configured.rs`): a
/// validated config object exposing `Getters`/`CopyGetters` accessors
/// rather than public fields, assembled once via `TypedBuilder`.
#[derive(Debug, Clone, Getters, CopyGetters, TypedBuilder)]
pub struct SchedulerConfig {
    #[getset(get = "pub")]
    template_job_path: PathBuf,
    #[getset(get = "pub")]
    job_prefix: String,
    #[getset(get = "pub")]
    path_child_script: PathBuf,
    #[getset(get = "pub")]
    env_to_inherit: Vec<String>,
    #[getset(get = "pub")]
    master_pod_name: Option<String>,
    #[getset(get = "pub")]
    master_pod_uid: Option<String>,
    #[getset(get = "pub")]
    dynamic_config_path: Option<PathBuf>,
    #[getset(get_copy = "pub")]
    max_child_jobs: Option<NonZeroUsize>,
    #[getset(get = "pub")]
    namespace: String,
    #[getset(get = "pub")]
    interpreter: String,
}

impl SchedulerConfig {
    /// Load and validate configuration from a TOML file on disk.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.to_path_buf()))
            .build()?;
        let raw: RawConfig = settings.try_deserialize()?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> anyhow::Result<Self> {
        if !raw.path_child_script.exists() {
            return Err(SchedulerError::ChildScriptMissing(raw.path_child_script).into());
        }

        let max_child_jobs = match raw.max_child_jobs {
            None => None,
            Some(n) if n > 0 => Some(NonZeroUsize::new(n as usize).expect("checked n > 0")),
            Some(n) => return Err(SchedulerError::InvalidChildJobCap(n).into()),
        };

        if let Some(dynamic_config_path) = &raw.dynamic_config_path {
            let is_ini = dynamic_config_path
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case("ini"))
                .unwrap_or(false);
            if !is_ini || ini::Ini::load_from_file(dynamic_config_path).is_err() {
                return Err(SchedulerError::UnsupportedConfigFormat(dynamic_config_path.clone()).into());
            }
        }

        Ok(SchedulerConfig::builder()
            .template_job_path(raw.template_job_path)
            .job_prefix(raw.job_prefix)
            .path_child_script(raw.path_child_script)
            .env_to_inherit(raw.env_to_inherit)
            .master_pod_name(raw.master_pod_name)
            .master_pod_uid(raw.master_pod_uid)
            .dynamic_config_path(raw.dynamic_config_path)
            .max_child_jobs(max_child_jobs)
            .namespace(raw.namespace)
            .interpreter(raw.interpreter)
            .build())
    }

    /// `Some((name, uid))` only when both halves of the master pod
    /// identity were provided, matching spec.md §6's "if both present".
    pub fn master_pod(&self) -> Option<(&str, &str)> {
        match (&self.master_pod_name, &self.master_pod_uid) {
            (Some(name), Some(uid)) => Some((name.as_str(), uid.as_str())),
            _ => None,
        }
    }
}
