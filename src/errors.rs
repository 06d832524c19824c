//! Typed error hierarchy for the presubmit runner.
//!
//! Three top-level enums cover the three subsystems:
//! - `SchedulerError`: graph validation and executor failures
//! - `ConfigError`: test configuration loading and selection
//! - `InvokeError`: running a single test command

use thiserror::Error;

/// Errors from the scheduling core.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Cycle detected in test dependencies: {}", .chain.join(" -> "))]
    CycleDetected { chain: Vec<String> },

    #[error("Test task for '{test}' could not be joined: {message}")]
    TaskJoin { test: String, message: String },
}

/// Errors from loading the test configuration and selecting tests.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read tests file at {path}: {source}")]
    ReadFailed {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse tests file: {0}")]
    ParseFailed(#[source] serde_json::Error),

    #[error("Unknown repository '{name}' (known: {})", .known.join(", "))]
    UnknownRepository { name: String, known: Vec<String> },

    #[error("Unknown test '{name}': no test with that name is defined")]
    UnknownTest { name: String },
}

/// Errors from invoking a single test.
///
/// The invoker folds these into a failed outcome; they never abort a run.
#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("No command configured for test '{test}'")]
    MissingCommand { test: String },

    #[error("Failed to spawn test command for '{test}': {source}")]
    SpawnFailed {
        test: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write test log at {path}: {source}")]
    LogWriteFailed {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to wait for test '{test}': {source}")]
    WaitFailed {
        test: String,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_detected_message_shows_chain() {
        let err = SchedulerError::CycleDetected {
            chain: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(
            err.to_string(),
            "Cycle detected in test dependencies: a -> b -> a"
        );
    }

    #[test]
    fn unknown_repository_lists_known_names() {
        let err = ConfigError::UnknownRepository {
            name: "nope".into(),
            known: vec!["core".into(), "tools".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("nope"));
        assert!(msg.contains("core, tools"));
    }

    #[test]
    fn config_error_read_failed_carries_path() {
        use std::path::PathBuf;
        let path = PathBuf::from("/repo/.presubmit/tests.json");
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = ConfigError::ReadFailed {
            path: path.clone(),
            source: io_err,
        };
        match &err {
            ConfigError::ReadFailed { path: p, source: s } => {
                assert_eq!(p, &path);
                assert_eq!(s.kind(), std::io::ErrorKind::NotFound);
            }
            _ => panic!("Expected ReadFailed"),
        }
    }

    #[test]
    fn invoke_error_spawn_failed_is_matchable() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "sh not found");
        let err = InvokeError::SpawnFailed {
            test: "unit".into(),
            source: io_err,
        };
        assert!(matches!(err, InvokeError::SpawnFailed { .. }));
        assert!(err.to_string().contains("unit"));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&SchedulerError::CycleDetected { chain: vec![] });
        assert_std_error(&ConfigError::UnknownTest { name: "x".into() });
        assert_std_error(&InvokeError::MissingCommand { test: "x".into() });
    }
}
