//! Artifact Handoff: writes a task to a deterministic path on shared
//! storage before remote dispatch, and stages configuration files so
//! children reload identical configuration.

use std::path::{Path, PathBuf};

use crate::task::Task;

/// `<workspace>/kannon/task_obj_<identity>.pkl`
pub fn task_artifact_path(workspace: &Path, task_id: &str) -> PathBuf {
    workspace.join("kannon").join(format!("task_obj_{task_id}.pkl"))
}

/// `<workspace>/kannon/conf/<basename>`
pub fn staged_config_path(workspace: &Path, dynamic_config_path: &Path) -> Option<PathBuf> {
    dynamic_config_path
        .file_name()
        .map(|basename| workspace.join("kannon").join("conf").join(basename))
}

/// Serialize `task` to its deterministic path on shared storage.
///
/// `Task` is a `#[typetag::serde]` trait object, so this works for any
/// concrete task type without the caller naming it - the closest Rust
/// analogue to pickling an arbitrary Python object.
pub fn stage_task(workspace: &Path, task: &dyn Task) -> anyhow::Result<PathBuf> {
    let path = task_artifact_path(workspace, task.id().as_str());
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_vec(task)?;
    std::fs::write(&path, json)?;
    Ok(path)
}

/// Read back a task previously written by [`stage_task`]. Used by the
/// child-side runner.
pub fn load_task(path: &Path) -> anyhow::Result<Box<dyn Task>> {
    let bytes = std::fs::read(path)?;
    let task: Box<dyn Task> = serde_json::from_slice(&bytes)?;
    Ok(task)
}

/// Copy the master's `dynamic_config_path` (already validated to be a
/// `.ini` file, see `config::SchedulerConfig::validate`) into
/// `<workspace>/kannon/conf/<basename>`, returning the staged path.
pub fn stage_dynamic_config(workspace: &Path, dynamic_config_path: &Path) -> anyhow::Result<PathBuf> {
    let dest = staged_config_path(workspace, dynamic_config_path)
        .ok_or_else(|| anyhow::anyhow!("dynamic config path has no file name: {dynamic_config_path:?}"))?;
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::copy(dynamic_config_path, &dest)?;
    Ok(dest)
}

/// Stage every configuration file the master has placed under
/// `<workspace>/kannon/conf/` back to the child's own local `./conf/`
/// directory, so master and child see identical configuration.
///
/// Invoked from the child-side runner, not the scheduler loop.
pub fn stage_conf_dir_locally(workspace: &Path, local_conf_dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let remote_conf_dir = workspace.join("kannon").join("conf");
    if !remote_conf_dir.is_dir() {
        return Ok(Vec::new());
    }
    std::fs::create_dir_all(local_conf_dir)?;

    let mut staged = Vec::new();
    for entry in walkdir::WalkDir::new(&remote_conf_dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
    {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let dest = local_conf_dir.join(entry.file_name());
        std::fs::copy(entry.path(), &dest)?;
        staged.push(dest);
    }
    Ok(staged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::testutil::FakeTask;

    #[test]
    fn stage_and_load_round_trip_preserves_identity() {
        let dir = tempfile::tempdir().unwrap();
        let task = FakeTask::leaf("round-trip-id");

        let path = stage_task(dir.path(), task.as_ref()).unwrap();
        assert_eq!(
            path,
            dir.path().join("kannon").join("task_obj_round-trip-id.pkl")
        );

        let loaded = load_task(&path).unwrap();
        assert_eq!(loaded.id(), task.id());
    }

    #[test]
    fn staged_config_path_uses_basename() {
        let workspace = Path::new("/workspace");
        let dynamic_config = Path::new("/home/user/app.ini");
        let staged = staged_config_path(workspace, dynamic_config).unwrap();
        assert_eq!(staged, Path::new("/workspace/kannon/conf/app.ini"));
    }

    #[test]
    fn stage_dynamic_config_copies_bytes() {
        let src_dir = tempfile::tempdir().unwrap();
        let workspace_dir = tempfile::tempdir().unwrap();
        let src_path = src_dir.path().join("app.ini");
        std::fs::write(&src_path, b"[section]\nkey=value\n").unwrap();

        let staged = stage_dynamic_config(workspace_dir.path(), &src_path).unwrap();
        let contents = std::fs::read_to_string(&staged).unwrap();
        assert_eq!(contents, "[section]\nkey=value\n");
    }

    #[test]
    fn stage_conf_dir_locally_copies_every_staged_file() {
        let workspace_dir = tempfile::tempdir().unwrap();
        let local_dir = tempfile::tempdir().unwrap();
        let remote_conf = workspace_dir.path().join("kannon").join("conf");
        std::fs::create_dir_all(&remote_conf).unwrap();
        std::fs::write(remote_conf.join("app.ini"), b"data").unwrap();

        let staged = stage_conf_dir_locally(workspace_dir.path(), local_dir.path().join("conf").as_path())
            .unwrap();
        assert_eq!(staged.len(), 1);
        assert!(staged[0].ends_with("app.ini"));
        assert!(staged[0].exists());
    }

    #[test]
    fn stage_conf_dir_locally_is_a_noop_when_nothing_staged() {
        let workspace_dir = tempfile::tempdir().unwrap();
        let local_dir = tempfile::tempdir().unwrap();
        let staged = stage_conf_dir_locally(workspace_dir.path(), local_dir.path()).unwrap();
        assert!(staged.is_empty());
    }
}
