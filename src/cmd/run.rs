//! Test run command: `presubmit run`.

use anyhow::{Context, Result};
use console::Term;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

use presubmit::config::Selection;
use presubmit::dag::{DagExecutor, ExecutorConfig, TestEvent, build_run, summarize};
use presubmit::invoker::CommandInvoker;
use presubmit::report::{RenderOptions, ReportFormat, render};
use presubmit::settings::CliOverrides;
use presubmit::ui::{RunUI, UiMode};

use super::super::{Cli, SelectArgs};

/// Options for `presubmit run`.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub select: SelectArgs,
    pub max_parallel: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub format: ReportFormat,
    pub report_file: Option<PathBuf>,
    pub no_progress: bool,
}

pub async fn cmd_run(cli: &Cli, project_dir: PathBuf, options: RunOptions) -> Result<()> {
    let overrides = CliOverrides {
        max_parallel: options.max_parallel,
        timeout_secs: options.timeout_secs,
        tests_file: None,
    };
    let (config, tests) = super::load_project(cli, project_dir, overrides)?;

    let selection = Selection::from_args(
        options.select.repo.as_deref(),
        options.select.only.as_deref(),
    );
    let selected = tests.select(&selection)?;
    let mut run = build_run(&selected, &tests.dependencies);

    let max_parallel = config.max_parallel();
    tracing::debug!(
        tests = run.len(),
        max_parallel,
        tests_file = %config.tests_file().display(),
        "starting presubmit run"
    );

    let (event_tx, mut event_rx) = mpsc::channel::<TestEvent>(100);
    let mut ui = RunUI::new(run.len(), UiMode::detect(options.no_progress));
    let display_handle = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            ui.handle_event(&event);
        }
    });

    let invoker = Arc::new(CommandInvoker::new(tests, config));
    let executor = DagExecutor::new(
        invoker,
        ExecutorConfig::default().with_max_parallel(max_parallel),
    )
    .with_event_channel(event_tx);

    let result = executor.execute(&mut run).await;

    // Closing the channel lets the display task drain and exit.
    drop(executor);
    display_handle.await.ok();

    let result = result?;
    let report = summarize(&run, &result.executed)
        .with_outcomes(result.outcomes)
        .with_duration(result.duration);

    let color = options.format == ReportFormat::Text && Term::stdout().features().colors_supported();
    let rendered = render(&report, options.format, RenderOptions { color })?;
    println!("{}", rendered.trim_end());

    if let Some(path) = &options.report_file {
        let plain = render(&report, options.format, RenderOptions { color: false })?;
        std::fs::write(path, plain)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
    }

    if !report.is_success() {
        anyhow::bail!(
            "Presubmit failed: {} failed, {} skipped",
            report.failed_count(),
            report.skipped.len()
        );
    }

    Ok(())
}
