//! CLI command implementations.
//!
//! | Module    | Commands handled  |
//! |-----------|-------------------|
//! | `run`     | `Run`             |
//! | `graph`   | `List`, `Check`   |
//! | `config`  | `Config`          |

pub mod config;
pub mod graph;
pub mod run;

pub use config::cmd_config;
pub use graph::{cmd_check, cmd_list};
pub use run::{RunOptions, cmd_run};

use anyhow::{Context, Result};
use presubmit::config::TestsFile;
use presubmit::settings::{CliOverrides, PresubmitConfig};
use std::path::PathBuf;

use super::Cli;

/// Resolve settings and load the tests file for a command.
fn load_project(
    cli: &Cli,
    project_dir: PathBuf,
    mut overrides: CliOverrides,
) -> Result<(PresubmitConfig, TestsFile)> {
    overrides.tests_file = cli.tests_file.clone();
    let config = PresubmitConfig::with_cli_args(project_dir, cli.verbose, overrides)?;

    let tests_path = config.tests_file();
    let tests = TestsFile::load(&tests_path).with_context(|| {
        format!(
            "Failed to load tests from {}. Create it or pass --tests-file.",
            tests_path.display()
        )
    })?;

    Ok((config, tests))
}
