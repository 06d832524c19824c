//! Ready-queue executors.
//!
//! [`execute`] is the serial executor: one test at a time, always the first
//! eligible test in declared order, re-scanning after every result.
//!
//! [`DagExecutor`] runs the same loop asynchronously and may dispatch
//! independent eligible tests concurrently. With `max_parallel == 1` it
//! produces the same execution order as [`execute`].

use crate::dag::builder::{TestIndex, TestRun};
use crate::dag::state::{ExecutionTimer, TestOutcome};
use crate::errors::SchedulerError;
use crate::invoker::TestInvoker;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{self, JoinError, JoinSet};

/// Run every reachable test of `run`, serially.
///
/// Performs at most `run.len()` dispatches. Each iteration picks the first
/// eligible test in declared order, calls `run_one`, and records the result.
/// The loop stops as soon as a full scan finds nothing eligible. Returns the
/// names of executed tests in execution order.
///
/// The caller is expected to have validated the run with
/// [`TestRun::validate`]; tests on a cycle are simply never eligible.
pub fn execute<F>(run: &mut TestRun, mut run_one: F) -> Vec<String>
where
    F: FnMut(&str) -> bool,
{
    let mut executed = Vec::with_capacity(run.len());

    for _ in 0..run.len() {
        let Some(index) = run.next_eligible() else {
            break;
        };
        let name = run.nodes[index].name.clone();

        tracing::debug!(test = %name, "dispatching test");
        let passed = run_one(&name);
        run.mark(index, passed);
        tracing::debug!(test = %name, passed, "test finished");

        executed.push(name);
    }

    executed
}

/// Events emitted during async execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TestEvent {
    /// A test was dispatched.
    Started { test: String },
    /// A test finished.
    Finished {
        test: String,
        passed: bool,
        duration_ms: u64,
    },
    /// No further progress is possible.
    RunCompleted {
        passed: usize,
        failed: usize,
        skipped: usize,
    },
}

/// Result of async execution.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Executed test names in completion order.
    pub executed: Vec<String>,
    /// Invoker outcome per executed test.
    pub outcomes: HashMap<String, TestOutcome>,
    /// Total duration.
    pub duration: Duration,
}

/// Configuration for the async executor.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Maximum tests in flight at once (at least 1).
    pub max_parallel: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self { max_parallel: 1 }
    }
}

impl ExecutorConfig {
    /// Create a config with specific max parallelism.
    pub fn with_max_parallel(mut self, max: usize) -> Self {
        self.max_parallel = max.max(1);
        self
    }
}

/// Async ready-queue executor backed by a [`TestInvoker`].
pub struct DagExecutor<I: TestInvoker + 'static> {
    invoker: Arc<I>,
    config: ExecutorConfig,
    event_tx: Option<mpsc::Sender<TestEvent>>,
}

impl<I: TestInvoker + 'static> DagExecutor<I> {
    /// Create a new executor.
    pub fn new(invoker: Arc<I>, config: ExecutorConfig) -> Self {
        Self {
            invoker,
            config,
            event_tx: None,
        }
    }

    /// Set the event channel for progress updates.
    pub fn with_event_channel(mut self, tx: mpsc::Sender<TestEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Execute the run to completion or exhaustion.
    ///
    /// Fails without running anything if the run contains a cycle. Test
    /// failures are recorded on the run and never abort execution.
    pub async fn execute(&self, run: &mut TestRun) -> Result<ExecutionResult, SchedulerError> {
        run.validate()?;

        let timer = ExecutionTimer::start();
        let max_parallel = self.config.max_parallel.max(1);

        let mut dispatched: HashSet<TestIndex> = HashSet::new();
        let mut in_flight: JoinSet<(TestIndex, TestOutcome)> = JoinSet::new();
        let mut task_tests: HashMap<task::Id, TestIndex> = HashMap::new();
        let mut executed = Vec::with_capacity(run.len());
        let mut outcomes = HashMap::new();

        loop {
            for index in run.eligible() {
                if in_flight.len() >= max_parallel {
                    break;
                }
                if !dispatched.insert(index) {
                    continue;
                }

                let name = run.nodes[index].name.clone();
                tracing::debug!(test = %name, in_flight = in_flight.len(), "dispatching test");
                self.emit_event(TestEvent::Started { test: name.clone() })
                    .await;

                let invoker = Arc::clone(&self.invoker);
                let handle = in_flight.spawn(async move {
                    let timer = ExecutionTimer::start();
                    let outcome = AssertUnwindSafe(invoker.invoke(&name))
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|_| {
                            TestOutcome::failure("test invocation panicked", timer.elapsed())
                        });
                    (index, outcome)
                });
                task_tests.insert(handle.id(), index);
            }

            let Some(joined) = in_flight.join_next_with_id().await else {
                break;
            };

            let (index, outcome) = match joined {
                Ok((id, finished)) => {
                    task_tests.remove(&id);
                    finished
                }
                Err(e) => return Err(join_failure(run, &task_tests, e)),
            };

            let name = run.nodes[index].name.clone();
            run.mark(index, outcome.passed);
            tracing::debug!(test = %name, passed = outcome.passed, "test finished");

            self.emit_event(TestEvent::Finished {
                test: name.clone(),
                passed: outcome.passed,
                duration_ms: outcome.duration.as_millis() as u64,
            })
            .await;

            executed.push(name.clone());
            outcomes.insert(name, outcome);
        }

        let passed = run.nodes().iter().filter(|n| n.status.is_passed()).count();
        let skipped = run.not_executed().count();
        let failed = executed.len() - passed;
        tracing::info!(passed, failed, skipped, "presubmit run finished");

        self.emit_event(TestEvent::RunCompleted {
            passed,
            failed,
            skipped,
        })
        .await;

        Ok(ExecutionResult {
            executed,
            outcomes,
            duration: timer.elapsed(),
        })
    }

    /// Emit an event to the event channel if configured.
    async fn emit_event(&self, event: TestEvent) {
        if let Some(ref tx) = self.event_tx {
            tx.send(event).await.ok();
        }
    }
}

/// Name the test whose task could not be joined.
fn join_failure(
    run: &TestRun,
    task_tests: &HashMap<task::Id, TestIndex>,
    err: JoinError,
) -> SchedulerError {
    let test = task_tests
        .get(&err.id())
        .and_then(|&index| run.node(index))
        .map_or_else(|| "<unknown>".to_string(), |node| node.name.clone());
    SchedulerError::TaskJoin {
        test,
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::builder::RunBuilder;
    use crate::dag::scheduler::TestStatus;
    use crate::dag::state::summarize;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn run(selected: &[&str], entries: &[(&str, &[&str])]) -> TestRun {
        let map: HashMap<String, Vec<String>> = entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
            .collect();
        RunBuilder::new(selected.iter().copied()).build(&map)
    }

    fn ci_run() -> TestRun {
        run(
            &["build", "unit", "integration"],
            &[("unit", &["build"]), ("integration", &["unit"])],
        )
    }

    /// Test double: fails the named tests, records calls.
    struct ScriptedInvoker {
        failing: HashSet<String>,
        calls: Mutex<Vec<String>>,
        running: AtomicUsize,
        max_seen: AtomicUsize,
        delay: Duration,
    }

    impl ScriptedInvoker {
        fn new(failing: &[&str]) -> Self {
            Self {
                failing: failing.iter().map(|s| s.to_string()).collect(),
                calls: Mutex::new(Vec::new()),
                running: AtomicUsize::new(0),
                max_seen: AtomicUsize::new(0),
                delay: Duration::ZERO,
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    #[async_trait]
    impl TestInvoker for ScriptedInvoker {
        async fn invoke(&self, test: &str) -> TestOutcome {
            self.calls.lock().unwrap().push(test.to_string());
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_seen.fetch_max(now, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.running.fetch_sub(1, Ordering::SeqCst);
            if test == "explode" {
                panic!("boom");
            }
            let passed = !self.failing.contains(test);
            TestOutcome::finished(passed, Some(if passed { 0 } else { 1 }), self.delay)
        }
    }

    // ---- serial executor ----

    #[test]
    fn test_all_pass_runs_in_dependency_order() {
        let mut r = ci_run();
        let executed = execute(&mut r, |_| true);
        assert_eq!(executed, vec!["build", "unit", "integration"]);
        assert!(summarize(&r, &executed).skipped.is_empty());
    }

    #[test]
    fn test_failure_skips_dependents() {
        let mut r = ci_run();
        let executed = execute(&mut r, |name| name != "unit");
        assert_eq!(executed, vec!["build", "unit"]);
        let report = summarize(&r, &executed);
        assert_eq!(report.skipped_names(), vec!["integration"]);
    }

    #[test]
    fn test_no_dependencies_runs_in_selection_order() {
        let mut r = run(&["c", "a", "b"], &[]);
        let executed = execute(&mut r, |_| false);
        assert_eq!(executed, vec!["c", "a", "b"]);
        assert!(r.nodes().iter().all(|n| n.status == TestStatus::Failed));
    }

    #[test]
    fn test_declared_order_preferred_after_each_dispatch() {
        // "late" becomes eligible once "root" passes and is declared before
        // "other", so it must run before "other".
        let mut r = run(&["root", "late", "other"], &[("late", &["root"])]);
        let executed = execute(&mut r, |_| true);
        assert_eq!(executed, vec!["root", "late", "other"]);
    }

    #[test]
    fn test_dependent_declared_first_waits() {
        let mut r = run(&["unit", "build"], &[("unit", &["build"])]);
        let executed = execute(&mut r, |_| true);
        assert_eq!(executed, vec!["build", "unit"]);
    }

    #[test]
    fn test_unselected_dependency_does_not_block() {
        let mut r = run(&["a"], &[("a", &["c"])]);
        let executed = execute(&mut r, |_| true);
        assert_eq!(executed, vec!["a"]);
    }

    #[test]
    fn test_skip_propagates_transitively() {
        let mut r = run(
            &["a", "b", "c", "d"],
            &[("b", &["a"]), ("c", &["b"]), ("d", &[])],
        );
        let executed = execute(&mut r, |name| name != "a");
        assert_eq!(executed, vec!["a", "d"]);
        assert_eq!(summarize(&r, &executed).skipped_names(), vec!["b", "c"]);
    }

    #[test]
    fn test_executed_tests_follow_their_dependencies() {
        let mut r = run(
            &["e", "d", "c", "b", "a"],
            &[
                ("e", &["d", "a"]),
                ("d", &["c"]),
                ("c", &["b", "a"]),
                ("b", &["a"]),
            ],
        );
        let executed = execute(&mut r, |_| true);
        assert_eq!(executed.len(), 5);
        for (pos, name) in executed.iter().enumerate() {
            let idx = r.index_of(name).unwrap();
            for dep in r.dependency_names(idx) {
                let dep_pos = executed.iter().position(|n| n == dep).unwrap();
                assert!(dep_pos < pos, "{dep} should run before {name}");
            }
        }
    }

    #[test]
    fn test_each_test_runs_at_most_once() {
        let mut r = run(&["a", "b"], &[("b", &["a"])]);
        let mut calls = Vec::new();
        execute(&mut r, |name| {
            calls.push(name.to_string());
            false
        });
        assert_eq!(calls, vec!["a"]);
    }

    #[test]
    fn test_cycle_members_never_run() {
        let mut r = run(&["a", "b", "free"], &[("a", &["b"]), ("b", &["a"])]);
        let executed = execute(&mut r, |_| true);
        assert_eq!(executed, vec!["free"]);
    }

    // ---- async executor ----

    #[tokio::test]
    async fn test_async_serial_matches_serial_executor() {
        let invoker = Arc::new(ScriptedInvoker::new(&["unit"]));
        let executor = DagExecutor::new(invoker.clone(), ExecutorConfig::default());

        let mut r = ci_run();
        let result = executor.execute(&mut r).await.unwrap();

        assert_eq!(result.executed, vec!["build", "unit"]);
        assert_eq!(*invoker.calls.lock().unwrap(), vec!["build", "unit"]);
        assert_eq!(r.status("integration"), Some(TestStatus::NotExecuted));
        assert_eq!(result.outcomes["unit"].exit_code, Some(1));
    }

    #[tokio::test]
    async fn test_async_rejects_cycles_before_running() {
        let invoker = Arc::new(ScriptedInvoker::new(&[]));
        let executor = DagExecutor::new(invoker.clone(), ExecutorConfig::default());

        let mut r = run(&["a", "b", "c"], &[("a", &["b"]), ("b", &["a"])]);
        let err = executor.execute(&mut r).await.unwrap_err();

        assert!(matches!(err, SchedulerError::CycleDetected { .. }));
        assert!(invoker.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_async_parallel_runs_independent_tests_together() {
        let invoker = Arc::new(
            ScriptedInvoker::new(&[]).with_delay(Duration::from_millis(50)),
        );
        let executor = DagExecutor::new(
            invoker.clone(),
            ExecutorConfig::default().with_max_parallel(3),
        );

        let mut r = run(
            &["root", "a", "b", "c", "join"],
            &[
                ("a", &["root"]),
                ("b", &["root"]),
                ("c", &["root"]),
                ("join", &["a", "b", "c"]),
            ],
        );
        let result = executor.execute(&mut r).await.unwrap();

        assert_eq!(result.executed.len(), 5);
        assert_eq!(result.executed.first().map(String::as_str), Some("root"));
        assert_eq!(result.executed.last().map(String::as_str), Some("join"));
        assert_eq!(invoker.max_seen.load(Ordering::SeqCst), 3);
        assert!(r.all_passed());
    }

    #[tokio::test]
    async fn test_async_respects_max_parallel() {
        let invoker = Arc::new(
            ScriptedInvoker::new(&[]).with_delay(Duration::from_millis(20)),
        );
        let executor = DagExecutor::new(
            invoker.clone(),
            ExecutorConfig::default().with_max_parallel(2),
        );

        let mut r = run(&["a", "b", "c", "d", "e"], &[]);
        let result = executor.execute(&mut r).await.unwrap();

        assert_eq!(result.executed.len(), 5);
        assert!(invoker.max_seen.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_async_panicking_invoker_records_failure() {
        let invoker = Arc::new(ScriptedInvoker::new(&[]));
        let executor = DagExecutor::new(invoker, ExecutorConfig::default());

        let mut r = run(&["explode", "after"], &[("after", &["explode"])]);
        let result = executor.execute(&mut r).await.unwrap();

        assert_eq!(result.executed, vec!["explode"]);
        assert_eq!(r.status("explode"), Some(TestStatus::Failed));
        assert_eq!(
            result.outcomes["explode"].error.as_deref(),
            Some("test invocation panicked")
        );
        assert_eq!(r.status("after"), Some(TestStatus::NotExecuted));
    }

    #[tokio::test]
    async fn test_async_emits_events() {
        let invoker = Arc::new(ScriptedInvoker::new(&["build"]));
        let (tx, mut rx) = mpsc::channel(16);
        let executor =
            DagExecutor::new(invoker, ExecutorConfig::default()).with_event_channel(tx);

        let mut r = ci_run();
        executor.execute(&mut r).await.unwrap();
        drop(executor);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }

        assert_eq!(
            events.first(),
            Some(&TestEvent::Started {
                test: "build".into()
            })
        );
        assert!(matches!(
            events.get(1),
            Some(TestEvent::Finished { passed: false, .. })
        ));
        assert_eq!(
            events.last(),
            Some(&TestEvent::RunCompleted {
                passed: 0,
                failed: 1,
                skipped: 2,
            })
        );
    }

    #[tokio::test]
    async fn test_async_empty_run() {
        let invoker = Arc::new(ScriptedInvoker::new(&[]));
        let executor = DagExecutor::new(invoker, ExecutorConfig::default());
        let mut r = run(&[], &[]);
        let result = executor.execute(&mut r).await.unwrap();
        assert!(result.executed.is_empty());
    }

    #[test]
    fn test_event_serialization() {
        let event = TestEvent::Started {
            test: "unit".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"started\""));
        assert!(json.contains("unit"));
    }

    #[test]
    fn test_max_parallel_floor_is_one() {
        assert_eq!(ExecutorConfig::default().with_max_parallel(0).max_parallel, 1);
    }

    #[tokio::test]
    async fn test_async_parallel_failure_skips_dependents() {
        let invoker = Arc::new(
            ScriptedInvoker::new(&["a"]).with_delay(Duration::from_millis(10)),
        );
        let executor = DagExecutor::new(
            invoker.clone(),
            ExecutorConfig::default().with_max_parallel(3),
        );

        let mut r = run(
            &["root", "a", "b", "c", "d", "e"],
            &[
                ("a", &["root"]),
                ("b", &["root"]),
                ("c", &["a"]),
                ("d", &["b"]),
                ("e", &["c", "d"]),
            ],
        );
        let result = executor.execute(&mut r).await.unwrap();
        let report = summarize(&r, &result.executed);

        let mut executed = result.executed.clone();
        executed.sort();
        assert_eq!(executed, vec!["a", "b", "d", "root"]);
        assert_eq!(report.skipped_names(), vec!["c", "e"]);
        assert_eq!(r.status("a"), Some(TestStatus::Failed));
        assert!(!invoker.calls.lock().unwrap().iter().any(|t| t == "c" || t == "e"));

        for (pos, name) in result.executed.iter().enumerate() {
            let idx = r.index_of(name).unwrap();
            for dep in r.dependency_names(idx) {
                let dep_pos = result.executed.iter().position(|n| n == dep).unwrap();
                assert!(dep_pos < pos, "{dep} should finish before {name}");
            }
        }
    }

    #[tokio::test]
    async fn test_join_failure_names_the_test() {
        let r = run(&["build", "unit"], &[]);
        let mut set: JoinSet<()> = JoinSet::new();
        let handle = set.spawn(tokio::time::sleep(Duration::from_secs(60)));
        let mut task_tests = HashMap::new();
        task_tests.insert(handle.id(), 1);
        handle.abort();

        let err = set.join_next_with_id().await.unwrap().unwrap_err();
        let failure = join_failure(&r, &task_tests, err);

        match failure {
            SchedulerError::TaskJoin { test, .. } => assert_eq!(test, "unit"),
            other => panic!("Expected TaskJoin, got {other:?}"),
        }
    }
}
