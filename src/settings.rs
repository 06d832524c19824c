//! Runtime settings for presubmit, read from `.presubmit/presubmit.toml`.
//!
//! Settings are layered: file → environment → CLI.
//!
//! # Configuration File Format
//!
//! ```toml
//! [execution]
//! max_parallel = 1
//! default_timeout_secs = 1800
//! shell = "sh"
//!
//! [logs]
//! dir = ".presubmit/logs"
//!
//! [tests.overrides."integration-*"]
//! timeout_secs = 3600
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the directory holding presubmit files inside a project.
pub const PRESUBMIT_DIR: &str = ".presubmit";

/// Execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSection {
    /// Maximum tests to run concurrently (1 = strictly serial)
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
    /// Timeout applied to tests that do not set their own
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,
    /// Shell used to run test commands
    #[serde(default = "default_shell")]
    pub shell: String,
}

fn default_max_parallel() -> usize {
    1
}

fn default_timeout_secs() -> u64 {
    1800
}

fn default_shell() -> String {
    "sh".to_string()
}

impl Default for ExecutionSection {
    fn default() -> Self {
        Self {
            max_parallel: default_max_parallel(),
            default_timeout_secs: default_timeout_secs(),
            shell: default_shell(),
        }
    }
}

/// Log capture settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogsSection {
    /// Directory for per-test logs, relative to the project directory
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

/// Per-test override settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestOverride {
    /// Override timeout for matching tests
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Test override configuration section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestsSection {
    /// Pattern-based overrides (e.g., "integration-*" -> TestOverride)
    #[serde(default)]
    pub overrides: BTreeMap<String, TestOverride>,
}

/// The complete presubmit.toml structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsToml {
    #[serde(default)]
    pub execution: ExecutionSection,
    #[serde(default)]
    pub logs: LogsSection,
    #[serde(default)]
    pub tests: TestsSection,
}

impl SettingsToml {
    /// Load settings from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse settings from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse presubmit.toml")
    }

    /// Load settings from `<presubmit_dir>/presubmit.toml`, or defaults if
    /// the file doesn't exist.
    pub fn load_or_default(presubmit_dir: &Path) -> Result<Self> {
        let path = presubmit_dir.join("presubmit.toml");
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save settings to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize presubmit.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write settings file: {}", path.display()))?;
        Ok(())
    }

    /// Timeout override for a test, from the first matching pattern.
    ///
    /// Patterns are tried in lexicographic order.
    pub fn timeout_override(&self, test: &str) -> Option<u64> {
        self.tests
            .overrides
            .iter()
            .filter(|(pattern, _)| pattern_matches(pattern, test))
            .find_map(|(_, o)| o.timeout_secs)
    }

    /// Validate the settings and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.execution.max_parallel == 0 {
            warnings.push("max_parallel is 0; it will be treated as 1".to_string());
        }
        if self.execution.default_timeout_secs == 0 {
            warnings.push("default_timeout_secs is 0; every test would time out".to_string());
        }
        if self.execution.shell.trim().is_empty() {
            warnings.push("shell is empty".to_string());
        }
        for (pattern, o) in &self.tests.overrides {
            if o.timeout_secs == Some(0) {
                warnings.push(format!(
                    "Override for pattern '{}' sets a zero timeout",
                    pattern
                ));
            }
        }

        warnings
    }
}

/// Check if a pattern matches a test name.
/// Supports simple glob patterns:
/// - `*` matches any sequence of characters
/// - `?` matches any single character
///
/// Matching is case-insensitive.
pub fn pattern_matches(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.to_lowercase().chars().collect();
    let name: Vec<char> = name.to_lowercase().chars().collect();
    glob_match(&pattern, &name)
}

fn glob_match(pattern: &[char], text: &[char]) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some(('*', rest)) => (0..=text.len()).any(|i| glob_match(rest, &text[i..])),
        Some(('?', rest)) => !text.is_empty() && glob_match(rest, &text[1..]),
        Some((c, rest)) => text.first() == Some(c) && glob_match(rest, &text[1..]),
    }
}

/// CLI-provided overrides.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub max_parallel: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub tests_file: Option<PathBuf>,
}

/// Resolved settings for one invocation.
///
/// Merges:
/// 1. presubmit.toml
/// 2. Environment variables (`PRESUBMIT_MAX_PARALLEL`, `PRESUBMIT_SHELL`)
/// 3. CLI arguments
#[derive(Debug, Clone)]
pub struct PresubmitConfig {
    /// Path to the project directory
    pub project_dir: PathBuf,
    /// Path to the .presubmit directory
    pub presubmit_dir: PathBuf,
    /// Parsed presubmit.toml
    pub toml: SettingsToml,
    /// CLI override: verbose mode
    pub verbose: bool,
    /// CLI overrides
    pub cli: CliOverrides,
}

impl PresubmitConfig {
    /// Create a new PresubmitConfig from a project directory.
    pub fn new(project_dir: PathBuf) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let presubmit_dir = project_dir.join(PRESUBMIT_DIR);
        let toml = SettingsToml::load_or_default(&presubmit_dir)?;

        Ok(Self {
            project_dir,
            presubmit_dir,
            toml,
            verbose: false,
            cli: CliOverrides::default(),
        })
    }

    /// Create PresubmitConfig with CLI overrides.
    pub fn with_cli_args(project_dir: PathBuf, verbose: bool, cli: CliOverrides) -> Result<Self> {
        let mut config = Self::new(project_dir)?;
        config.verbose = verbose;
        config.cli = cli;
        Ok(config)
    }

    /// Max parallel tests (CLI → env → file), at least 1.
    pub fn max_parallel(&self) -> usize {
        self.cli
            .max_parallel
            .or_else(|| {
                std::env::var("PRESUBMIT_MAX_PARALLEL")
                    .ok()
                    .and_then(|v| v.parse().ok())
            })
            .unwrap_or(self.toml.execution.max_parallel)
            .max(1)
    }

    /// Shell used for test commands (env → file).
    pub fn shell(&self) -> String {
        std::env::var("PRESUBMIT_SHELL").unwrap_or_else(|_| self.toml.execution.shell.clone())
    }

    /// Effective timeout for a test.
    ///
    /// CLI `--timeout` wins, then the test's own `timeout_secs`, then a
    /// pattern override, then the default.
    pub fn test_timeout(&self, test: &str, own: Option<u64>) -> Duration {
        let secs = self
            .cli
            .timeout_secs
            .or(own)
            .or_else(|| self.toml.timeout_override(test))
            .unwrap_or(self.toml.execution.default_timeout_secs);
        Duration::from_secs(secs)
    }

    /// Get path to the tests file.
    pub fn tests_file(&self) -> PathBuf {
        match &self.cli.tests_file {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => self.project_dir.join(path),
            None => self.presubmit_dir.join("tests.json"),
        }
    }

    /// Get path to the settings file.
    pub fn settings_file(&self) -> PathBuf {
        self.presubmit_dir.join("presubmit.toml")
    }

    /// Get path to the log directory.
    pub fn log_dir(&self) -> PathBuf {
        match &self.toml.logs.dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => self.project_dir.join(dir),
            None => self.presubmit_dir.join("logs"),
        }
    }

    /// Validate settings and return warnings.
    pub fn validate(&self) -> Vec<String> {
        self.toml.validate()
    }
}
