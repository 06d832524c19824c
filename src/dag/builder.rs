//! Run builder for constructing the per-invocation dependency graph.
//!
//! The builder takes the tests selected for one invocation plus the global
//! dependency map and produces a [`TestRun`] restricted to the selection.
//! Dependencies naming tests outside the selection are dropped rather than
//! left dangling.

use crate::dag::cycle;
use crate::dag::scheduler::{TestNode, TestStatus};
use crate::errors::SchedulerError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Index into the test list of a run.
pub type TestIndex = usize;

/// A dependency edge removed because its target was not selected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroppedDependency {
    /// The test that declared the dependency
    pub test: String,
    /// The dependency that is not part of this run
    pub dependency: String,
}

/// The complete set of tests selected for one invocation.
///
/// Tests keep the caller-specified order; all dependency indices refer to
/// tests of the same run.
#[derive(Debug, Clone, PartialEq)]
pub struct TestRun {
    /// Tests in declared order
    pub(crate) nodes: Vec<TestNode>,
    /// Map from test name to index
    pub(crate) index_map: HashMap<String, TestIndex>,
    /// Edges dropped during construction
    pub(crate) dropped: Vec<DroppedDependency>,
}

impl TestRun {
    /// Get the number of tests in the run.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the run is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Get a test by its index.
    pub fn node(&self, index: TestIndex) -> Option<&TestNode> {
        self.nodes.get(index)
    }

    /// Get a test by its name.
    pub fn get(&self, name: &str) -> Option<&TestNode> {
        self.index_map.get(name).and_then(|&i| self.nodes.get(i))
    }

    /// Get the index for a test name.
    pub fn index_of(&self, name: &str) -> Option<TestIndex> {
        self.index_map.get(name).copied()
    }

    /// All tests in declared order.
    pub fn nodes(&self) -> &[TestNode] {
        &self.nodes
    }

    /// Test names in declared order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|n| n.name.as_str())
    }

    /// Dependencies dropped because they were outside the selection.
    pub fn dropped_dependencies(&self) -> &[DroppedDependency] {
        &self.dropped
    }

    /// Reject the run if its dependency graph contains a cycle.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        match cycle::find_cycle(self) {
            Some(chain) => Err(SchedulerError::CycleDetected { chain }),
            None => Ok(()),
        }
    }
}

/// Builder for constructing test runs.
pub struct RunBuilder {
    selected: Vec<String>,
    log_dropped: bool,
}

impl RunBuilder {
    /// Create a new builder for the given selection, in scheduling order.
    pub fn new<I, S>(selected: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            selected: selected.into_iter().map(Into::into).collect(),
            log_dropped: true,
        }
    }

    /// Record dropped dependencies and duplicates without logging them.
    ///
    /// For callers that report these problems themselves.
    pub fn quiet(mut self) -> Self {
        self.log_dropped = false;
        self
    }

    /// Build the run against the global dependency map.
    ///
    /// A test with no entry in `all_dependencies` has no dependencies.
    /// This never fails: cycles are reported separately by
    /// [`TestRun::validate`].
    pub fn build(self, all_dependencies: &HashMap<String, Vec<String>>) -> TestRun {
        let log_dropped = self.log_dropped;
        let mut index_map: HashMap<String, TestIndex> = HashMap::new();
        let mut names: Vec<String> = Vec::with_capacity(self.selected.len());

        for name in self.selected {
            if index_map.contains_key(&name) {
                if log_dropped {
                    tracing::warn!(test = %name, "test selected more than once; keeping first position");
                }
                continue;
            }
            index_map.insert(name.clone(), names.len());
            names.push(name);
        }

        let mut dropped = Vec::new();
        let nodes = names
            .into_iter()
            .map(|name| {
                let declared = all_dependencies
                    .get(&name)
                    .map(Vec::as_slice)
                    .unwrap_or_default();

                let mut dependencies: Vec<TestIndex> = Vec::with_capacity(declared.len());
                for dep in declared {
                    match index_map.get(dep) {
                        Some(&idx) => {
                            if !dependencies.contains(&idx) {
                                dependencies.push(idx);
                            }
                        }
                        None => {
                            if log_dropped {
                                tracing::warn!(
                                    test = %name,
                                    dependency = %dep,
                                    "dependency is not selected for this run; ignoring it"
                                );
                            }
                            dropped.push(DroppedDependency {
                                test: name.clone(),
                                dependency: dep.clone(),
                            });
                        }
                    }
                }

                TestNode {
                    name,
                    dependencies,
                    status: TestStatus::NotExecuted,
                }
            })
            .collect();

        TestRun {
            nodes,
            index_map,
            dropped,
        }
    }
}

/// Convenience wrapper: build a run from a selection and a dependency map.
pub fn build_run(
    selected: &[String],
    all_dependencies: &HashMap<String, Vec<String>>,
) -> TestRun {
    RunBuilder::new(selected.iter().cloned()).build(all_dependencies)
}
