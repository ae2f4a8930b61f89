//! Process-wide task scheduler (spec §5): tile builds form a dependency
//! graph (a parent tile's build depends on every child tile it aggregates),
//! dispatched across a bounded thread pool in topologically-ready batches.
//! A failed task's dependents are skipped rather than attempted, so one bad
//! reconstruction doesn't cascade into spurious failures further up the
//! tree.

use std::collections::HashMap;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use rayon::prelude::*;

use crate::error::Result;

/// One unit of scheduled work. Tasks report their own name for diagnostics;
/// `run` does the actual tile build and is expected to perform its own
/// file I/O, since the scheduler only orders execution.
pub trait SchedulableTask: Send + Sync {
    fn run(&self) -> Result<()>;

    fn name(&self) -> &str {
        "task"
    }
}

/// Wraps a closure as a [`SchedulableTask`], for tests and small call
/// sites that don't warrant a dedicated type.
pub struct FnTask<F> {
    pub name: String,
    pub f: F,
}

impl<F: Fn() -> Result<()> + Send + Sync> SchedulableTask for FnTask<F> {
    fn run(&self) -> Result<()> {
        (self.f)()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// The dependency graph the scheduler dispatches. An edge `a -> b` means
/// `b` cannot start until `a` finishes (petgraph's `Incoming` direction on
/// `b` is exactly its unmet-dependency count).
pub struct TaskGraph {
    graph: DiGraph<Box<dyn SchedulableTask>, ()>,
}

impl Default for TaskGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskGraph {
    pub fn new() -> Self {
        Self { graph: DiGraph::new() }
    }

    pub fn add_task(&mut self, task: Box<dyn SchedulableTask>) -> NodeIndex {
        self.graph.add_node(task)
    }

    /// Records that `dependent` cannot run until `depends_on` has finished.
    pub fn add_dependency(&mut self, dependent: NodeIndex, depends_on: NodeIndex) {
        self.graph.add_edge(depends_on, dependent, ());
    }
}

#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub name: String,
    /// `Err` holds the task's error message; a task is never retried.
    pub result: std::result::Result<(), String>,
    /// Set when an ancestor failed and this task never ran.
    pub skipped: bool,
}

/// Dispatches a [`TaskGraph`] across a bounded `rayon` pool, one
/// topological level at a time: every task whose dependencies have
/// resolved this round runs in parallel, and the next level's readiness is
/// recomputed before the following round starts.
pub struct Scheduler {
    pool: rayon::ThreadPool,
}

impl Scheduler {
    pub fn new(num_threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()
            .map_err(|e| crate::error::Error::InvariantViolation(format!("failed to build thread pool: {e}")))?;
        Ok(Self { pool })
    }

    /// Runs every task in `graph` to completion (or skip), respecting
    /// dependency order. Returns one outcome per task, in no particular
    /// order.
    pub fn run(&self, graph: TaskGraph) -> Vec<TaskOutcome> {
        let g = graph.graph;
        let mut in_degree: HashMap<NodeIndex, usize> =
            g.node_indices().map(|n| (n, g.neighbors_directed(n, Direction::Incoming).count())).collect();

        let mut failed_ancestor: HashMap<NodeIndex, bool> = HashMap::new();
        let mut outcomes: HashMap<NodeIndex, TaskOutcome> = HashMap::new();

        let mut ready: Vec<NodeIndex> = in_degree.iter().filter(|(_, &d)| d == 0).map(|(&n, _)| n).collect();

        while !ready.is_empty() {
            let batch = std::mem::take(&mut ready);

            let batch_outcomes: Vec<(NodeIndex, TaskOutcome, bool)> = self.pool.install(|| {
                batch
                    .par_iter()
                    .map(|&n| {
                        let task = &g[n];
                        let ancestor_failed = *failed_ancestor.get(&n).unwrap_or(&false);
                        if ancestor_failed {
                            (n, TaskOutcome { name: task.name().to_string(), result: Ok(()), skipped: true }, true)
                        } else {
                            let result = task.run().map_err(|e| e.to_string());
                            let failed = result.is_err();
                            (n, TaskOutcome { name: task.name().to_string(), result, skipped: false }, failed)
                        }
                    })
                    .collect()
            });

            for (n, outcome, failed_here) in batch_outcomes {
                outcomes.insert(n, outcome);
                let propagate = failed_here || *failed_ancestor.get(&n).unwrap_or(&false);

                for succ in g.neighbors_directed(n, Direction::Outgoing) {
                    if propagate {
                        failed_ancestor.insert(succ, true);
                    }
                    let d = in_degree.get_mut(&succ).expect("successor must have an in-degree entry");
                    *d -= 1;
                    if *d == 0 {
                        ready.push(succ);
                    }
                }
            }
        }

        outcomes.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_task(name: &str, counter: Arc<AtomicUsize>) -> Box<dyn SchedulableTask> {
        Box::new(FnTask {
            name: name.to_string(),
            f: move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
        })
    }

    fn failing_task(name: &str) -> Box<dyn SchedulableTask> {
        Box::new(FnTask {
            name: name.to_string(),
            f: || Err(crate::error::Error::InvariantViolation("boom".into())),
        })
    }

    #[test]
    fn independent_tasks_all_run() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut graph = TaskGraph::new();
        for i in 0..5 {
            graph.add_task(counting_task(&format!("leaf-{i}"), counter.clone()));
        }

        let scheduler = Scheduler::new(4).unwrap();
        let outcomes = scheduler.run(graph);

        assert_eq!(outcomes.len(), 5);
        assert_eq!(counter.load(Ordering::SeqCst), 5);
        assert!(outcomes.iter().all(|o| o.result.is_ok() && !o.skipped));
    }

    #[test]
    fn parent_runs_only_after_both_children() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut graph = TaskGraph::new();
        let child_a = graph.add_task(counting_task("child-a", counter.clone()));
        let child_b = graph.add_task(counting_task("child-b", counter.clone()));
        let parent = graph.add_task(counting_task("parent", counter.clone()));
        graph.add_dependency(parent, child_a);
        graph.add_dependency(parent, child_b);

        let scheduler = Scheduler::new(4).unwrap();
        let outcomes = scheduler.run(graph);

        assert_eq!(outcomes.len(), 3);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert!(outcomes.iter().all(|o| o.result.is_ok() && !o.skipped));
    }

    #[test]
    fn a_failed_dependency_skips_its_dependent() {
        let mut graph = TaskGraph::new();
        let child = graph.add_task(failing_task("child"));
        let counter = Arc::new(AtomicUsize::new(0));
        let parent = graph.add_task(counting_task("parent", counter.clone()));
        graph.add_dependency(parent, child);

        let scheduler = Scheduler::new(2).unwrap();
        let outcomes = scheduler.run(graph);

        let parent_outcome = outcomes.iter().find(|o| o.name == "parent").unwrap();
        assert!(parent_outcome.skipped);
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        let child_outcome = outcomes.iter().find(|o| o.name == "child").unwrap();
        assert!(!child_outcome.skipped);
        assert!(child_outcome.result.is_err());
    }
}
