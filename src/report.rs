//! Report rendering.
//!
//! The text rendering is meant to be pasted into a code-review comment; with
//! colour enabled it doubles as the terminal summary.

use crate::dag::{Report, TestStatus};
use anyhow::{Context, Result};
use console::style;
use std::fmt::Write as _;
use std::time::Duration;

/// Output format for a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for ReportFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => anyhow::bail!("Invalid format '{}'. Valid values: text, json", s),
        }
    }
}

/// Options for text rendering.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderOptions {
    /// Emit terminal colours
    pub color: bool,
}

/// Render a report in the requested format.
pub fn render(report: &Report, format: ReportFormat, options: RenderOptions) -> Result<String> {
    match format {
        ReportFormat::Text => Ok(render_text(report, options)),
        ReportFormat::Json => render_json(report),
    }
}

/// Render a report as pretty JSON.
pub fn render_json(report: &Report) -> Result<String> {
    serde_json::to_string_pretty(report).context("Failed to serialize report to JSON")
}

/// Render a report as a plain-text results block.
pub fn render_text(report: &Report, options: RenderOptions) -> String {
    let paint = |text: String, status: Option<TestStatus>| -> String {
        if !options.color {
            return text;
        }
        match status {
            Some(TestStatus::Passed) => style(text).green().to_string(),
            Some(TestStatus::Failed) => style(text).red().bold().to_string(),
            _ => style(text).yellow().to_string(),
        }
    };

    let mut out = String::new();

    let verdict = if report.is_success() {
        paint("PASSED".to_string(), Some(TestStatus::Passed))
    } else {
        paint("FAILED".to_string(), Some(TestStatus::Failed))
    };
    let _ = writeln!(
        out,
        "Presubmit {}: {} passed, {} failed, {} skipped ({})",
        verdict,
        report.passed_count(),
        report.failed_count(),
        report.skipped.len(),
        format_duration(report.duration)
    );

    if !report.executed.is_empty() {
        let _ = writeln!(out);
        let width = report
            .executed
            .iter()
            .map(|t| t.name.len())
            .max()
            .unwrap_or(0);
        for test in &report.executed {
            let label = match test.status {
                TestStatus::Passed => "PASS",
                TestStatus::Failed => "FAIL",
                TestStatus::NotExecuted => "----",
            };
            let mut line = format!(
                "  {} {:<width$}",
                paint(label.to_string(), Some(test.status)),
                test.name,
                width = width
            );
            if let Some(outcome) = &test.outcome {
                let _ = write!(line, "  {}", format_duration(outcome.duration));
                if outcome.timed_out {
                    line.push_str("  (timed out)");
                } else if let Some(err) = &outcome.error {
                    let _ = write!(line, "  ({})", err);
                }
                if test.status == TestStatus::Failed {
                    if let Some(log) = &outcome.log_path {
                        let _ = write!(line, "  log: {}", log.display());
                    }
                }
            }
            let _ = writeln!(out, "{}", line.trim_end());
        }
    }

    if !report.skipped.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Skipped:");
        for test in &report.skipped {
            let reason = if test.blocked_by.is_empty() {
                "dependencies never passed".to_string()
            } else {
                format!("blocked by {}", test.blocked_by.join(", "))
            };
            let _ = writeln!(out, "  {} {} ({})", paint("SKIP".to_string(), None), test.name, reason);
        }
    }

    if !report.dropped_dependencies.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Ignored dependencies (not selected for this run):");
        for dropped in &report.dropped_dependencies {
            let _ = writeln!(out, "  {} -> {}", dropped.test, dropped.dependency);
        }
    }

    out
}

/// Format a duration as `1.2s` or `3m04s`.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 60 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{:.1}s", duration.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::{DroppedDependency, ExecutedTest, SkippedTest, TestOutcome};
    use std::path::PathBuf;

    fn failing_report() -> Report {
        Report {
            executed: vec![
                ExecutedTest {
                    name: "build".into(),
                    status: TestStatus::Passed,
                    outcome: Some(TestOutcome::finished(true, Some(0), Duration::from_millis(1200))),
                },
                ExecutedTest {
                    name: "unit".into(),
                    status: TestStatus::Failed,
                    outcome: Some(
                        TestOutcome::finished(false, Some(1), Duration::from_secs(64))
                            .with_log(PathBuf::from("/tmp/logs/unit.log")),
                    ),
                },
            ],
            skipped: vec![SkippedTest {
                name: "integration".into(),
                blocked_by: vec!["unit".into()],
            }],
            dropped_dependencies: vec![DroppedDependency {
                test: "unit".into(),
                dependency: "codegen".into(),
            }],
            duration: Duration::from_secs(66),
            generated_at: "2024-01-01T00:00:00+00:00".into(),
        }
    }

    #[test]
    fn test_render_text_failure() {
        let text = render_text(&failing_report(), RenderOptions::default());
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(
            lines[0],
            "Presubmit FAILED: 1 passed, 1 failed, 1 skipped (1m06s)"
        );
        assert_eq!(lines[2], "  PASS build  1.2s");
        assert_eq!(lines[3], "  FAIL unit   1m04s  log: /tmp/logs/unit.log");
        assert!(text.contains("Skipped:\n  SKIP integration (blocked by unit)"));
        assert!(text.contains("  unit -> codegen"));
    }

    #[test]
    fn test_render_text_success() {
        let report = Report {
            executed: vec![ExecutedTest {
                name: "lint".into(),
                status: TestStatus::Passed,
                outcome: None,
            }],
            ..Default::default()
        };
        let text = render_text(&report, RenderOptions::default());
        assert!(text.starts_with("Presubmit PASSED: 1 passed, 0 failed, 0 skipped"));
        assert!(text.contains("  PASS lint\n"));
        assert!(!text.contains("Skipped:"));
    }

    #[test]
    fn test_render_text_timeout_note() {
        let mut outcome = TestOutcome::failure("timed out after 5s", Duration::from_secs(5));
        outcome.timed_out = true;
        let report = Report {
            executed: vec![ExecutedTest {
                name: "slow".into(),
                status: TestStatus::Failed,
                outcome: Some(outcome),
            }],
            ..Default::default()
        };
        let text = render_text(&report, RenderOptions::default());
        assert!(text.contains("FAIL slow  5.0s  (timed out)"));
    }

    #[test]
    fn test_render_json() {
        let json = render(&failing_report(), ReportFormat::Json, RenderOptions::default()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["executed"][1]["status"], "failed");
        assert_eq!(value["skipped"][0]["name"], "integration");
        assert_eq!(value["duration"], 66000);
    }

    #[test]
    fn test_report_format_from_str() {
        assert_eq!("json".parse::<ReportFormat>().unwrap(), ReportFormat::Json);
        assert_eq!("TEXT".parse::<ReportFormat>().unwrap(), ReportFormat::Text);
        assert!("xml".parse::<ReportFormat>().is_err());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(240)), "0.2s");
        assert_eq!(format_duration(Duration::from_secs(59)), "59.0s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m05s");
    }
}
