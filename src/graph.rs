//! Graph Materializer.
//!
//! Post-order traversal of the dependency DAG from a root task,
//! deduplicated by identity, producing the initial execution queue.
//! Diamond dependencies are emitted exactly once; the root is always
//! the last element.
//!
//! Implemented with an explicit work stack rather than naive recursion
//! (spec.md §9 "Recursive materialization") since the DAG is arbitrary
//! user input and may be deep.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use log::debug;
use log::trace;

use crate::task::{Task, TaskId};

struct Frame {
    task: Arc<dyn Task>,
    deps: Vec<Arc<dyn Task>>,
    next: usize,
}

impl Frame {
    fn new(task: Arc<dyn Task>) -> Self {
        let deps = task.dependencies();
        Frame { task, deps, next: 0 }
    }

    /// Returns the next dependency not yet in `visited`, advancing past
    /// any already-visited ones (diamond dedup).
    fn next_unvisited(&mut self, visited: &HashSet<TaskId>) -> Option<Arc<dyn Task>> {
        while self.next < self.deps.len() {
            let dep = self.deps[self.next].clone();
            self.next += 1;
            if !visited.contains(&dep.id()) {
                return Some(dep);
            }
        }
        None
    }
}

/// Build the initial execution queue for `root`.
///
/// Every transitively reachable task appears exactly once, after all of
/// its own dependencies.
pub fn materialize(root: Arc<dyn Task>) -> VecDeque<Arc<dyn Task>> {
    let mut queue = VecDeque::new();
    let mut visited: HashSet<TaskId> = HashSet::new();
    let mut stack: Vec<Frame> = Vec::new();

    visited.insert(root.id());
    stack.push(Frame::new(root));

    while let Some(frame) = stack.last_mut() {
        match frame.next_unvisited(&visited) {
            Some(dep) => {
                trace!("Descending into dependency {}", dep.id());
                visited.insert(dep.id());
                stack.push(Frame::new(dep));
            }
            None => {
                let frame = stack.pop().expect("stack just yielded a last_mut frame");
                trace!("Queueing {}", frame.task.id());
                queue.push_back(frame.task);
            }
        }
    }

    debug!("Materialized {} tasks", queue.len());
    queue
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::testutil::FakeTask;

    #[test]
    fn single_node_with_no_dependencies() {
        let a = FakeTask::leaf("a");
        let queue = materialize(a.clone());
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].id(), a.id());
    }

    #[test]
    fn dependencies_precede_dependents() {
        let d = FakeTask::leaf("d");
        let c = FakeTask::new("c", vec![d.clone()]);
        let queue = materialize(c.clone());
        let ids: Vec<_> = queue.iter().map(|t| t.id().as_str().to_string()).collect();
        assert_eq!(ids, vec!["d", "c"]);
    }

    #[test]
    fn diamond_dependency_emitted_once() {
        // D -> {L, R} -> J
        let d = FakeTask::leaf("d");
        let l = FakeTask::new("l", vec![d.clone()]);
        let r = FakeTask::new("r", vec![d.clone()]);
        let j = FakeTask::new("j", vec![l.clone(), r.clone()]);

        let queue = materialize(j.clone());
        let ids: Vec<_> = queue.iter().map(|t| t.id().as_str().to_string()).collect();

        assert_eq!(ids.iter().filter(|id| id.as_str() == "d").count(), 1);
        assert_eq!(queue.len(), 4);
        assert_eq!(ids.last().unwrap(), "j");

        let d_pos = ids.iter().position(|id| id == "d").unwrap();
        let l_pos = ids.iter().position(|id| id == "l").unwrap();
        let r_pos = ids.iter().position(|id| id == "r").unwrap();
        let j_pos = ids.iter().position(|id| id == "j").unwrap();
        assert!(d_pos < l_pos);
        assert!(d_pos < r_pos);
        assert!(l_pos < j_pos);
        assert!(r_pos < j_pos);
    }

    #[test]
    fn empty_dependency_set_appends_directly() {
        let a = FakeTask::leaf("only");
        let queue = materialize(a);
        assert_eq!(queue.len(), 1);
    }
}
