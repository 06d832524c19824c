//! Run progress UI.
//!
//! Consumes [`TestEvent`]s from the executor and draws progress on stderr:
//! - `full`: overall progress bar plus a spinner per running test
//! - `minimal`: one line per finished test
//! - `quiet`: nothing

use crate::dag::TestEvent;
use crate::report::format_duration;
use crate::ui::icons::{CHECK, CLOCK, CROSS, RUNNING, SKIP};
use console::{Term, style};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::collections::HashMap;
use std::io::Write;
use std::time::Duration;

/// Output mode for the progress UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UiMode {
    #[default]
    Full,
    Minimal,
    Quiet,
}

impl UiMode {
    /// Pick a mode: quiet if disabled, full on a terminal, minimal otherwise.
    pub fn detect(no_progress: bool) -> Self {
        if no_progress {
            Self::Quiet
        } else if Term::stderr().features().is_attended() {
            Self::Full
        } else {
            Self::Minimal
        }
    }
}

/// Progress display for a single run.
pub struct RunUI {
    mode: UiMode,
    multi: MultiProgress,
    header_bar: ProgressBar,
    running: HashMap<String, ProgressBar>,
    term: Term,
}

impl RunUI {
    /// Create a UI for a run of `total` tests.
    pub fn new(total: usize, mode: UiMode) -> Self {
        let target = match mode {
            UiMode::Full => ProgressDrawTarget::stderr(),
            UiMode::Minimal | UiMode::Quiet => ProgressDrawTarget::hidden(),
        };
        let multi = MultiProgress::with_draw_target(target);

        let header_bar = multi.add(ProgressBar::new(total as u64));
        header_bar.set_style(
            ProgressStyle::default_bar()
                .template("{prefix:.bold} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▓▒░"),
        );
        header_bar.set_prefix("presubmit");
        header_bar.set_message("starting");

        Self {
            mode,
            multi,
            header_bar,
            running: HashMap::new(),
            term: Term::stderr(),
        }
    }

    /// Update the display for one event.
    pub fn handle_event(&mut self, event: &TestEvent) {
        match self.mode {
            UiMode::Quiet => {}
            UiMode::Minimal => self.handle_minimal(event),
            UiMode::Full => self.handle_full(event),
        }
    }

    fn handle_minimal(&self, event: &TestEvent) {
        match event {
            TestEvent::Started { .. } => {}
            TestEvent::Finished {
                test,
                passed,
                duration_ms,
            } => {
                let mark = if *passed { "PASS" } else { "FAIL" };
                let _ = writeln!(
                    &self.term,
                    "{} {} ({})",
                    mark,
                    test,
                    format_duration(Duration::from_millis(*duration_ms))
                );
            }
            TestEvent::RunCompleted {
                passed,
                failed,
                skipped,
            } => {
                let _ = writeln!(
                    &self.term,
                    "Done: {} passed, {} failed, {} skipped",
                    passed, failed, skipped
                );
            }
        }
    }

    fn handle_full(&mut self, event: &TestEvent) {
        match event {
            TestEvent::Started { test } => self.on_started(test),
            TestEvent::Finished {
                test,
                passed,
                duration_ms,
            } => self.on_finished(test, *passed, Duration::from_millis(*duration_ms)),
            TestEvent::RunCompleted {
                passed,
                failed,
                skipped,
            } => self.on_completed(*passed, *failed, *skipped),
        }
    }

    fn on_started(&mut self, test: &str) {
        let bar = self.multi.add(ProgressBar::new_spinner());
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("  {spinner:.cyan} {prefix:.bold} {msg} {elapsed:.dim}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_prefix(test.to_string());
        bar.set_message(format!("{}running", RUNNING));
        bar.enable_steady_tick(Duration::from_millis(100));
        self.running.insert(test.to_string(), bar);
        self.header_bar.set_message(test.to_string());
    }

    fn on_finished(&mut self, test: &str, passed: bool, duration: Duration) {
        if let Some(bar) = self.running.remove(test) {
            bar.finish_and_clear();
        }
        self.header_bar.inc(1);

        let line = if passed {
            format!(
                "  {}{} {}",
                CHECK,
                style(test).green().bold(),
                style(format_duration(duration)).dim()
            )
        } else {
            format!(
                "  {}{} {}",
                CROSS,
                style(test).red().bold(),
                style(format_duration(duration)).dim()
            )
        };
        self.multi.println(line).ok();
    }

    fn on_completed(&mut self, passed: usize, failed: usize, skipped: usize) {
        for (_, bar) in self.running.drain() {
            bar.finish_and_clear();
        }
        self.header_bar.finish_and_clear();

        if skipped > 0 {
            self.multi
                .println(format!(
                    "  {}{} not run",
                    SKIP,
                    style(skipped).yellow().bold()
                ))
                .ok();
        }
        self.multi
            .println(format!(
                "{}{} passed, {} failed",
                CLOCK,
                style(passed).green().bold(),
                if failed > 0 {
                    style(failed).red().bold().to_string()
                } else {
                    style(failed).dim().to_string()
                }
            ))
            .ok();
    }

    /// Number of tests currently shown as running.
    pub fn running_count(&self) -> usize {
        self.running.len()
    }
}
