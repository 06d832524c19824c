use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "presubmit")]
#[command(version, about = "Dependency-ordered presubmit test runner")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    /// Path to the tests file (defaults to .presubmit/tests.json)
    #[arg(long, global = true)]
    pub tests_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Test selection shared by `run` and `list`.
#[derive(Args, Clone, Debug, Default)]
pub struct SelectArgs {
    /// Run the tests registered for this repository
    #[arg(long)]
    pub repo: Option<String>,

    /// Run only these tests (comma-separated); overrides --repo
    #[arg(long)]
    pub only: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the selected tests in dependency order
    Run {
        #[command(flatten)]
        select: SelectArgs,

        /// Maximum tests to run concurrently
        #[arg(long)]
        max_parallel: Option<usize>,

        /// Timeout in seconds applied to every test
        #[arg(long)]
        timeout: Option<u64>,

        /// Report format: text, json
        #[arg(long, default_value = "text")]
        format: String,

        /// Also write the report to this file
        #[arg(long)]
        report_file: Option<PathBuf>,

        /// Disable the progress display
        #[arg(long)]
        no_progress: bool,
    },
    /// Show the selected tests, their dependencies and execution waves
    List {
        #[command(flatten)]
        select: SelectArgs,
    },
    /// Validate the tests file and check for dependency cycles
    Check {
        /// Check only the tests registered for this repository
        #[arg(long)]
        repo: Option<String>,
    },
    /// View or validate settings
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current settings
    Show,
    /// Validate settings and show any warnings
    Validate,
    /// Initialize a default presubmit.toml file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    presubmit::logging::init(cli.verbose);

    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    match &cli.command {
        Commands::Run {
            select,
            max_parallel,
            timeout,
            format,
            report_file,
            no_progress,
        } => {
            let options = cmd::RunOptions {
                select: select.clone(),
                max_parallel: *max_parallel,
                timeout_secs: *timeout,
                format: format.parse()?,
                report_file: report_file.clone(),
                no_progress: *no_progress,
            };
            cmd::cmd_run(&cli, project_dir, options).await?;
        }
        Commands::List { select } => cmd::cmd_list(&cli, project_dir, select)?,
        Commands::Check { repo } => cmd::cmd_check(&cli, project_dir, repo.as_deref())?,
        Commands::Config { command } => cmd::cmd_config(&cli, project_dir, command.clone())?,
    }

    Ok(())
}
