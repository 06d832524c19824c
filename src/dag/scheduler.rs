//! Scheduling state for a run: test status and eligibility.
//!
//! A test is eligible when it has not been executed and every dependency has
//! passed. Eligibility is re-evaluated after every execution because a
//! dependency's outcome is only known at runtime.

use crate::dag::builder::{TestIndex, TestRun};
use serde::{Deserialize, Serialize};

/// Status of a test in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    /// Test has not run yet
    #[default]
    NotExecuted,
    /// Test ran and passed
    Passed,
    /// Test ran and failed
    Failed,
}

impl TestStatus {
    /// Check if the test has been executed.
    pub fn is_executed(&self) -> bool {
        !matches!(self, Self::NotExecuted)
    }

    /// Check if the test passed.
    pub fn is_passed(&self) -> bool {
        matches!(self, Self::Passed)
    }

    /// Status for a pass/fail result.
    pub fn from_passed(passed: bool) -> Self {
        if passed { Self::Passed } else { Self::Failed }
    }
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestStatus::NotExecuted => write!(f, "not executed"),
            TestStatus::Passed => write!(f, "passed"),
            TestStatus::Failed => write!(f, "failed"),
        }
    }
}

/// A test in a run with its filtered dependencies and current status.
#[derive(Debug, Clone, PartialEq)]
pub struct TestNode {
    /// Unique test name
    pub name: String,
    /// Indices of tests that must pass first, in declared order
    pub dependencies: Vec<TestIndex>,
    /// Current status
    pub status: TestStatus,
}

impl TestRun {
    /// Check whether the test at `index` may run now.
    pub fn is_eligible(&self, index: TestIndex) -> bool {
        let Some(node) = self.nodes.get(index) else {
            return false;
        };
        node.status == TestStatus::NotExecuted
            && node
                .dependencies
                .iter()
                .all(|&dep| self.nodes.get(dep).is_some_and(|d| d.status.is_passed()))
    }

    /// First eligible test in declared order.
    pub fn next_eligible(&self) -> Option<TestIndex> {
        (0..self.nodes.len()).find(|&i| self.is_eligible(i))
    }

    /// All eligible tests in declared order.
    pub fn eligible(&self) -> Vec<TestIndex> {
        (0..self.nodes.len())
            .filter(|&i| self.is_eligible(i))
            .collect()
    }

    /// Record the result of executing a test.
    pub fn mark(&mut self, index: TestIndex, passed: bool) {
        if let Some(node) = self.nodes.get_mut(index) {
            node.status = TestStatus::from_passed(passed);
        }
    }

    /// Record the result of executing a test, by name.
    pub fn mark_by_name(&mut self, name: &str, passed: bool) {
        if let Some(index) = self.index_of(name) {
            self.mark(index, passed);
        }
    }

    /// Status of a test by name.
    pub fn status(&self, name: &str) -> Option<TestStatus> {
        self.get(name).map(|n| n.status)
    }

    /// Dependency names of the test at `index`.
    pub fn dependency_names(&self, index: TestIndex) -> Vec<&str> {
        self.nodes
            .get(index)
            .map(|n| {
                n.dependencies
                    .iter()
                    .filter_map(|&d| self.nodes.get(d).map(|dep| dep.name.as_str()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Tests that were never executed.
    pub fn not_executed(&self) -> impl Iterator<Item = &TestNode> {
        self.nodes
            .iter()
            .filter(|n| n.status == TestStatus::NotExecuted)
    }

    /// Check if every test passed.
    pub fn all_passed(&self) -> bool {
        self.nodes.iter().all(|n| n.status.is_passed())
    }

    /// Compute execution waves assuming every test passes.
    ///
    /// Each wave lists the tests (in declared order) whose dependencies are
    /// all in earlier waves, i.e. the tests that could run concurrently.
    /// Tests on a cycle never appear.
    pub fn compute_waves(&self) -> Vec<Vec<String>> {
        let mut waves = Vec::new();
        let mut done = vec![false; self.nodes.len()];

        loop {
            let ready: Vec<TestIndex> = self
                .nodes
                .iter()
                .enumerate()
                .filter(|(i, node)| !done[*i] && node.dependencies.iter().all(|&d| done[d]))
                .map(|(i, _)| i)
                .collect();

            if ready.is_empty() {
                break;
            }

            for &i in &ready {
                done[i] = true;
            }
            waves.push(ready.iter().map(|&i| self.nodes[i].name.clone()).collect());
        }

        waves
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::builder::RunBuilder;
    use std::collections::HashMap;

    fn run(selected: &[&str], entries: &[(&str, &[&str])]) -> TestRun {
        let map: HashMap<String, Vec<String>> = entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
            .collect();
        RunBuilder::new(selected.iter().copied()).build(&map)
    }

    #[test]
    fn test_initial_eligibility() {
        let r = run(&["build", "unit", "lint"], &[("unit", &["build"])]);
        assert_eq!(r.eligible(), vec![0, 2]);
        assert_eq!(r.next_eligible(), Some(0));
    }

    #[test]
    fn test_eligibility_after_pass() {
        let mut r = run(&["build", "unit"], &[("unit", &["build"])]);
        r.mark(0, true);
        assert!(!r.is_eligible(0));
        assert!(r.is_eligible(1));
    }

    #[test]
    fn test_failed_dependency_blocks_dependent() {
        let mut r = run(&["build", "unit"], &[("unit", &["build"])]);
        r.mark_by_name("build", false);
        assert_eq!(r.status("build"), Some(TestStatus::Failed));
        assert_eq!(r.next_eligible(), None);
        assert_eq!(
            r.not_executed().map(|n| n.name.as_str()).collect::<Vec<_>>(),
            vec!["unit"]
        );
    }

    #[test]
    fn test_self_dependency_never_eligible() {
        let r = run(&["a"], &[("a", &["a"])]);
        assert!(!r.is_eligible(0));
    }

    #[test]
    fn test_out_of_range_index_is_not_eligible() {
        let r = run(&["a"], &[]);
        assert!(!r.is_eligible(5));
    }

    #[test]
    fn test_wave_computation_diamond() {
        let r = run(
            &["01", "02", "03", "04"],
            &[("02", &["01"]), ("03", &["01"]), ("04", &["02", "03"])],
        );
        let waves = r.compute_waves();
        assert_eq!(waves.len(), 3);
        assert_eq!(waves[0], vec!["01"]);
        assert_eq!(waves[1], vec!["02", "03"]);
        assert_eq!(waves[2], vec!["04"]);
    }

    #[test]
    fn test_wave_computation_multiple_roots() {
        let r = run(&["01", "02", "03"], &[("03", &["01", "02"])]);
        let waves = r.compute_waves();
        assert_eq!(waves, vec![vec!["01", "02"], vec!["03"]]);
    }

    #[test]
    fn test_dependency_names() {
        let r = run(&["a", "b", "c"], &[("c", &["b", "a"])]);
        assert_eq!(r.dependency_names(2), vec!["b", "a"]);
        assert!(r.dependency_names(0).is_empty());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(TestStatus::Passed.to_string(), "passed");
        assert_eq!(TestStatus::Failed.to_string(), "failed");
        assert_eq!(TestStatus::NotExecuted.to_string(), "not executed");
    }
}
