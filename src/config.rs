//! Test definitions and selection, loaded from `.presubmit/tests.json`.
//!
//! ```json
//! {
//!   "tests": {
//!     "build": { "command": "make build", "timeout_secs": 600 },
//!     "unit": { "command": "make test" }
//!   },
//!   "dependencies": { "unit": ["build"] },
//!   "repositories": { "core": ["build", "unit"] }
//! }
//! ```

use crate::dag::{RunBuilder, find_cycle};
use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// How to run a single test.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestDefinition {
    /// Shell command to run
    pub command: String,
    /// Timeout for this test, overriding settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Working directory, relative to the project directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
    /// Extra environment variables
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

impl TestDefinition {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }
}

/// The full tests.json format.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestsFile {
    /// Test name -> how to run it
    #[serde(default)]
    pub tests: BTreeMap<String, TestDefinition>,
    /// Test name -> names of tests that must pass first
    #[serde(default)]
    pub dependencies: HashMap<String, Vec<String>>,
    /// Repository name -> tests to run for it, in scheduling order
    #[serde(default)]
    pub repositories: BTreeMap<String, Vec<String>>,
}

/// Which tests to run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Selection {
    /// Every defined test, in name order
    #[default]
    All,
    /// The test list registered for a repository
    Repository(String),
    /// An explicit list of test names
    Only(Vec<String>),
}

impl Selection {
    /// Build a selection from CLI arguments. `--only` wins over `--repo`.
    pub fn from_args(repo: Option<&str>, only: Option<&str>) -> Self {
        if let Some(only) = only {
            let names: Vec<String> = only
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            return Self::Only(names);
        }
        match repo {
            Some(repo) => Self::Repository(repo.to_string()),
            None => Self::All,
        }
    }
}

impl TestsFile {
    /// Load the tests file from disk.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse the tests file from a JSON string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(content).map_err(ConfigError::ParseFailed)
    }

    /// Get a test definition by name.
    pub fn test(&self, name: &str) -> Option<&TestDefinition> {
        self.tests.get(name)
    }

    /// Resolve a selection into test names, in scheduling order.
    pub fn select(&self, selection: &Selection) -> Result<Vec<String>, ConfigError> {
        match selection {
            Selection::All => Ok(self.tests.keys().cloned().collect()),
            Selection::Repository(name) => {
                self.repositories
                    .get(name)
                    .cloned()
                    .ok_or_else(|| ConfigError::UnknownRepository {
                        name: name.clone(),
                        known: self.repositories.keys().cloned().collect(),
                    })
            }
            Selection::Only(names) => {
                if let Some(unknown) = names.iter().find(|n| !self.tests.contains_key(*n)) {
                    return Err(ConfigError::UnknownTest {
                        name: unknown.clone(),
                    });
                }
                Ok(names.clone())
            }
        }
    }

    /// Validate the file and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        for (name, def) in &self.tests {
            if def.command.trim().is_empty() {
                warnings.push(format!("Test '{}' has an empty command", name));
            }
            if def.timeout_secs == Some(0) {
                warnings.push(format!("Test '{}' has a zero timeout", name));
            }
        }

        let mut dependents: Vec<&String> = self.dependencies.keys().collect();
        dependents.sort();
        for name in dependents {
            if !self.tests.contains_key(name) {
                warnings.push(format!(
                    "Dependencies declared for undefined test '{}'",
                    name
                ));
            }
            for dep in &self.dependencies[name] {
                if !self.tests.contains_key(dep) {
                    warnings.push(format!(
                        "Test '{}' depends on undefined test '{}'",
                        name, dep
                    ));
                }
            }
        }

        for (repo, names) in &self.repositories {
            for name in names {
                if !self.tests.contains_key(name) {
                    warnings.push(format!(
                        "Repository '{}' lists undefined test '{}'",
                        repo, name
                    ));
                }
            }
        }

        let everything = RunBuilder::new(self.tests.keys().cloned())
            .quiet()
            .build(&self.dependencies);
        if let Some(chain) = find_cycle(&everything) {
            warnings.push(format!(
                "Dependency cycle between tests: {}",
                chain.join(" -> ")
            ));
        }

        warnings
    }
}
