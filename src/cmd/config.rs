//! Settings view and validation commands: `presubmit config`.

use anyhow::{Context, Result};
use std::path::PathBuf;

use presubmit::settings::{CliOverrides, PresubmitConfig, SettingsToml};

use super::super::{Cli, ConfigCommands};

pub fn cmd_config(cli: &Cli, project_dir: PathBuf, command: Option<ConfigCommands>) -> Result<()> {
    let overrides = CliOverrides {
        tests_file: cli.tests_file.clone(),
        ..Default::default()
    };
    let config = PresubmitConfig::with_cli_args(project_dir, cli.verbose, overrides)?;
    let settings_path = config.settings_file();

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Presubmit Settings");
            println!("==================");
            println!();

            if settings_path.exists() {
                println!("Settings file: {}", settings_path.display());
            } else {
                println!("No presubmit.toml found at {}", settings_path.display());
                println!("Using default settings.");
            }
            println!();

            let toml = &config.toml;
            println!("[execution]");
            println!("  max_parallel = {}", toml.execution.max_parallel);
            println!(
                "  default_timeout_secs = {}",
                toml.execution.default_timeout_secs
            );
            println!("  shell = \"{}\"", toml.execution.shell);
            println!();

            if let Some(dir) = &toml.logs.dir {
                println!("[logs]");
                println!("  dir = \"{}\"", dir.display());
                println!();
            }

            if !toml.tests.overrides.is_empty() {
                println!("[tests.overrides]");
                for (pattern, override_cfg) in &toml.tests.overrides {
                    println!("  \"{}\":", pattern);
                    if let Some(secs) = override_cfg.timeout_secs {
                        println!("    timeout_secs = {}", secs);
                    }
                }
                println!();
            }

            println!("Effective values (with env/CLI overrides):");
            println!("  max_parallel = {}", config.max_parallel());
            println!("  shell = \"{}\"", config.shell());
            println!("  tests_file = {}", config.tests_file().display());
            println!("  log_dir = {}", config.log_dir().display());
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating settings...");
            println!();

            if !settings_path.exists() {
                println!("No presubmit.toml found. Using defaults (valid).");
                return Ok(());
            }

            let warnings = config.validate();
            if warnings.is_empty() {
                println!("Settings are valid.");
            } else {
                println!("Settings warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if settings_path.exists() {
                println!("presubmit.toml already exists at {}", settings_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            std::fs::create_dir_all(&config.presubmit_dir).with_context(|| {
                format!("Failed to create {}", config.presubmit_dir.display())
            })?;

            SettingsToml::default().save(&settings_path)?;

            println!("Created presubmit.toml at {}", settings_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [execution] max_parallel, default_timeout_secs, shell");
            println!("  - [logs] dir");
            println!("  - [tests.overrides.\"pattern-*\"] for test-specific timeouts");
            println!();
        }
    }

    Ok(())
}
