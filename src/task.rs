//! Task Interface.
//!
//! The capability set every node in the dependency DAG must satisfy:
//! stable identity, a side-effect-free completeness check, dependency
//! enumeration, a placement tag, and an operation to run the task
//! in-process when its placement is [`Placement::Local`].

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A deterministic string identity, stable across serialization.
///
/// Two tasks with identical identity are the same unit of work and must
/// never be executed twice (spec invariant 1/2).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        TaskId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        TaskId(s)
    }
}

/// Where a task runs: in the master process, or as an isolated child
/// container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Placement {
    Local,
    Remote,
}

/// One unit of work in the dependency DAG.
///
/// Implementations are expected to be cheap to clone behind an `Arc` -
/// the graph keeps a single reference-counted node per identity rather
/// than duplicating diamond dependencies (see DESIGN.md).
///
/// Tagged with `#[typetag::serde]` so a heterogeneous queue of task
/// types can be written to, and read back from, shared storage as one
/// `Box<dyn Task>`/`Arc<dyn Task>` - the closest Rust analogue to
/// pickling an arbitrary Python object.
#[typetag::serde(tag = "task_type")]
pub trait Task: Send + Sync {
    /// Stable, deterministic identity derived from task type and parameters.
    fn id(&self) -> TaskId;

    /// Human-readable class-of-work label, used for logging and job-name prefixes.
    fn family(&self) -> &str;

    /// The task's direct dependencies. The transitive closure must be acyclic.
    fn dependencies(&self) -> Vec<Arc<dyn Task>>;

    /// LOCAL (run in master process) or REMOTE (run in a child container).
    fn placement(&self) -> Placement;

    /// Side-effect-free predicate. Transitions monotonically false -> true.
    fn is_complete(&self) -> bool;

    /// Produce the side effects that make `is_complete()` true.
    ///
    /// The scheduler itself only ever calls this for LOCAL tasks, on a
    /// blocking thread (matching the "a stuck LOCAL task blocks the
    /// whole run" design decision) - a REMOTE task's work happens in a
    /// child process that deserializes the same task and calls this
    /// same method there, outside the scheduler's control.
    fn run_local(&self) -> anyhow::Result<()>;
}

/// Human-readable `"{family}_{id}"` tag used in log lines, mirroring
/// `Kannon._gen_task_info` in the original implementation.
pub fn task_info(task: &dyn Task) -> String {
    format!("{}_{}", task.family(), task.id())
}

/// Test doubles for `Task`. Kept in-crate rather than pulled from a
/// mocking framework, matching the teacher repo (which has none either).
#[cfg(any(test, feature = "test-util"))]
pub mod testutil {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Serialize, Deserialize)]
    pub struct FakeTask {
        id: String,
        family: String,
        placement: Placement,
        #[serde(skip)]
        complete: Arc<AtomicBool>,
        #[serde(skip)]
        should_fail: Arc<AtomicBool>,
        #[serde(skip)]
        run_count: Arc<AtomicUsize>,
        #[serde(skip)]
        deps: Vec<Arc<dyn Task>>,
    }

    #[typetag::serde]
    impl Task for FakeTask {
        fn id(&self) -> TaskId {
            TaskId::new(self.id.clone())
        }

        fn family(&self) -> &str {
            &self.family
        }

        fn dependencies(&self) -> Vec<Arc<dyn Task>> {
            self.deps.clone()
        }

        fn placement(&self) -> Placement {
            self.placement
        }

        fn is_complete(&self) -> bool {
            self.complete.load(Ordering::SeqCst)
        }

        fn run_local(&self) -> anyhow::Result<()> {
            self.run_count.fetch_add(1, Ordering::SeqCst);
            if self.should_fail.load(Ordering::SeqCst) {
                anyhow::bail!("fake task {} was configured to fail", self.id);
            }
            self.complete.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    impl FakeTask {
        /// A LOCAL task with no dependencies that is never expected to
        /// need its completeness flipped from outside `run_local`.
        pub fn leaf(id: &str) -> Arc<dyn Task> {
            Self::new(id, vec![])
        }

        /// A LOCAL task depending on `deps`.
        pub fn new(id: &str, deps: Vec<Arc<dyn Task>>) -> Arc<dyn Task> {
            Self::with_handle(id, Placement::Local, deps).0
        }

        /// Build a task together with a handle test code can use to flip
        /// completeness (simulating a child job finishing) or force a
        /// failure, independent of the `Arc<dyn Task>` handed to the
        /// scheduler.
        pub fn with_handle(
            id: &str,
            placement: Placement,
            deps: Vec<Arc<dyn Task>>,
        ) -> (Arc<dyn Task>, FakeTaskHandle) {
            let complete = Arc::new(AtomicBool::new(false));
            let should_fail = Arc::new(AtomicBool::new(false));
            let run_count = Arc::new(AtomicUsize::new(0));
            let task: Arc<dyn Task> = Arc::new(FakeTask {
                id: id.to_string(),
                family: "fake".to_string(),
                placement,
                complete: complete.clone(),
                should_fail: should_fail.clone(),
                run_count: run_count.clone(),
                deps,
            });
            (
                task,
                FakeTaskHandle {
                    complete,
                    should_fail,
                    run_count,
                },
            )
        }
    }

    #[derive(Clone)]
    pub struct FakeTaskHandle {
        complete: Arc<AtomicBool>,
        should_fail: Arc<AtomicBool>,
        run_count: Arc<AtomicUsize>,
    }

    impl FakeTaskHandle {
        pub fn mark_complete(&self) {
            self.complete.store(true, Ordering::SeqCst);
        }

        pub fn set_should_fail(&self, fail: bool) {
            self.should_fail.store(fail, Ordering::SeqCst);
        }

        pub fn run_count(&self) -> usize {
            self.run_count.load(Ordering::SeqCst)
        }
    }
}
