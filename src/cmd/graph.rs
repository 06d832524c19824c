//! Dependency inspection commands: `presubmit list` and `presubmit check`.

use anyhow::Result;
use std::path::PathBuf;

use presubmit::config::Selection;
use presubmit::dag::{DroppedDependency, RunBuilder, build_run};
use presubmit::settings::CliOverrides;

use super::super::{Cli, SelectArgs};

pub fn cmd_list(cli: &Cli, project_dir: PathBuf, select: &SelectArgs) -> Result<()> {
    let (_config, tests) = super::load_project(cli, project_dir, CliOverrides::default())?;

    let selection = Selection::from_args(select.repo.as_deref(), select.only.as_deref());
    let selected = tests.select(&selection)?;
    let run = build_run(&selected, &tests.dependencies);

    if run.is_empty() {
        println!();
        println!("No tests selected.");
        println!();
        return Ok(());
    }

    let width = run.names().map(str::len).max().unwrap_or(4).max(4);

    println!();
    println!("{:<width$}  {:<30} Command", "Test", "Depends on", width = width);
    println!("{}", "─".repeat(width + 42));
    for (index, node) in run.nodes().iter().enumerate() {
        let deps = run.dependency_names(index);
        let deps = if deps.is_empty() {
            "-".to_string()
        } else {
            deps.join(", ")
        };
        let command = tests.test(&node.name).map_or("", |d| d.command.as_str());
        println!("{:<width$}  {:<30} {}", node.name, deps, command, width = width);
    }
    println!();

    if let Err(e) = run.validate() {
        println!("{}", console::style(e.to_string()).red().bold());
        println!();
        return Ok(());
    }

    println!("{}", console::style("Execution waves").bold().cyan());
    for (i, wave) in run.compute_waves().iter().enumerate() {
        println!("  Wave {}: {}", i, wave.join(", "));
    }
    println!();

    let dropped: Vec<_> = run.dropped_dependencies().iter().collect();
    print_dropped(&dropped);
    Ok(())
}

pub fn cmd_check(cli: &Cli, project_dir: PathBuf, repo: Option<&str>) -> Result<()> {
    let (config, tests) = super::load_project(cli, project_dir, CliOverrides::default())?;

    println!();
    println!("Checking {}...", config.tests_file().display());
    println!();

    let mut warnings = tests.validate();
    warnings.extend(config.validate());

    let selection = Selection::from_args(repo, None);
    let selected = tests.select(&selection)?;
    let run = RunBuilder::new(selected).quiet().build(&tests.dependencies);

    if warnings.is_empty() {
        println!("Tests file is valid ({} tests selected).", run.len());
    } else {
        println!("Warnings:");
        for warning in &warnings {
            println!("  - {}", warning);
        }
    }
    println!();

    // Undefined dependencies are already listed among the warnings.
    let dropped: Vec<_> = run
        .dropped_dependencies()
        .iter()
        .filter(|d| tests.test(&d.dependency).is_some())
        .collect();
    print_dropped(&dropped);

    run.validate()?;
    Ok(())
}

fn print_dropped(dropped: &[&DroppedDependency]) {
    if dropped.is_empty() {
        return;
    }
    println!("Ignored dependencies (not selected):");
    for d in dropped {
        println!("  {} -> {}", d.test, d.dependency);
    }
    println!();
}
