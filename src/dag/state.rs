//! Result reporting for a finished run.
//!
//! The [`Report`] separates executed tests (in execution order) from skipped
//! tests (lexicographic order). Rendering it is done elsewhere.

use crate::dag::builder::{DroppedDependency, TestRun};
use crate::dag::scheduler::TestStatus;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Outcome of invoking a single test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestOutcome {
    /// Whether the test passed
    pub passed: bool,
    /// Process exit code, if the process exited normally
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Whether the test was killed for exceeding its timeout
    #[serde(default)]
    pub timed_out: bool,
    /// Wall-clock duration of the invocation
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Captured output, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_path: Option<PathBuf>,
    /// Error message if the test could not be run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TestOutcome {
    /// Outcome for a test that ran to completion.
    pub fn finished(passed: bool, exit_code: Option<i32>, duration: Duration) -> Self {
        Self {
            passed,
            exit_code,
            timed_out: false,
            duration,
            log_path: None,
            error: None,
        }
    }

    /// Outcome for a test that could not be run or was aborted.
    pub fn failure(error: impl Into<String>, duration: Duration) -> Self {
        Self {
            passed: false,
            exit_code: None,
            timed_out: false,
            duration,
            log_path: None,
            error: Some(error.into()),
        }
    }

    /// Attach the path of the captured log.
    pub fn with_log(mut self, path: PathBuf) -> Self {
        self.log_path = Some(path);
        self
    }
}

/// An executed test with its final status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutedTest {
    pub name: String,
    pub status: TestStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<TestOutcome>,
}

/// A test that never became eligible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedTest {
    pub name: String,
    /// Dependencies that did not pass
    pub blocked_by: Vec<String>,
}

/// Summary of a finished run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Executed tests in execution order
    pub executed: Vec<ExecutedTest>,
    /// Skipped tests in lexicographic order
    pub skipped: Vec<SkippedTest>,
    /// Dependencies ignored because they were not selected
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dropped_dependencies: Vec<DroppedDependency>,
    /// Total execution time
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// When the report was generated (RFC 3339)
    pub generated_at: String,
}

impl Report {
    /// Attach invoker outcomes to the executed tests.
    pub fn with_outcomes(mut self, mut outcomes: HashMap<String, TestOutcome>) -> Self {
        for test in &mut self.executed {
            if let Some(outcome) = outcomes.remove(&test.name) {
                test.outcome = Some(outcome);
            }
        }
        self
    }

    /// Set the total execution time.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Names of executed tests in execution order.
    pub fn executed_names(&self) -> Vec<&str> {
        self.executed.iter().map(|t| t.name.as_str()).collect()
    }

    /// Names of skipped tests.
    pub fn skipped_names(&self) -> Vec<&str> {
        self.skipped.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn passed_count(&self) -> usize {
        self.executed
            .iter()
            .filter(|t| t.status == TestStatus::Passed)
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.executed
            .iter()
            .filter(|t| t.status == TestStatus::Failed)
            .count()
    }

    /// Total tests in the run.
    pub fn total(&self) -> usize {
        self.executed.len() + self.skipped.len()
    }

    /// True when every test ran and passed.
    pub fn is_success(&self) -> bool {
        self.failed_count() == 0 && self.skipped.is_empty()
    }
}

/// Summarize a run after the executor has finished.
///
/// `executed_in_order` is the executor's output; tests still
/// `NotExecuted` are reported as skipped.
pub fn summarize(run: &TestRun, executed_in_order: &[String]) -> Report {
    let executed = executed_in_order
        .iter()
        .filter_map(|name| {
            run.get(name).map(|node| ExecutedTest {
                name: node.name.clone(),
                status: node.status,
                outcome: None,
            })
        })
        .collect();

    let mut skipped: Vec<SkippedTest> = run
        .nodes()
        .iter()
        .filter(|node| node.status == TestStatus::NotExecuted)
        .map(|node| SkippedTest {
            name: node.name.clone(),
            blocked_by: node
                .dependencies
                .iter()
                .filter_map(|&d| run.node(d))
                .filter(|dep| !dep.status.is_passed())
                .map(|dep| dep.name.clone())
                .collect(),
        })
        .inspect(|t| tracing::debug!(test = %t.name, blocked_by = ?t.blocked_by, "test skipped"))
        .collect();
    skipped.sort_by(|a, b| a.name.cmp(&b.name));

    Report {
        executed,
        skipped,
        dropped_dependencies: run.dropped_dependencies().to_vec(),
        duration: Duration::ZERO,
        generated_at: chrono::Utc::now().to_rfc3339(),
    }
}

/// Tracks execution timing.
pub struct ExecutionTimer {
    start: Instant,
}

impl ExecutionTimer {
    /// Start a new timer.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed time since start.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Serde helpers for Duration serialization.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
