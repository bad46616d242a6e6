//! Configuration view and validation commands: `gatekeeper config`.

use anyhow::Result;
use std::path::Path;

use super::super::ConfigCommands;

pub fn cmd_config(project_dir: &Path, command: Option<ConfigCommands>) -> Result<()> {
    use gatekeeper::config::{GATEKEEPER_DIR, GatekeeperToml};

    let gatekeeper_dir = project_dir.join(GATEKEEPER_DIR);
    let config_path = gatekeeper_dir.join("gatekeeper.toml");

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Gatekeeper Configuration");
            println!("========================");
            println!();

            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No gatekeeper.toml found at {}", config_path.display());
                println!("Using default configuration.");
            }
            println!();

            let toml = GatekeeperToml::load_or_default(&gatekeeper_dir)?;

            println!("[reviewer]");
            println!(
                "  name = \"{}\" ({})",
                toml.reviewer.name,
                toml.reviewer.persona().display_name()
            );
            println!("  model = \"{}\"", toml.reviewer.model);
            if !toml.reviewer.focus_areas.is_empty() {
                println!("  focus_areas = {:?}", toml.reviewer.focus_areas);
            }
            if !toml.reviewer.ignore_patterns.is_empty() {
                println!("  ignore_patterns = {:?}", toml.reviewer.ignore_patterns);
            }
            if toml.reviewer.system_prompt.is_some() {
                println!("  system_prompt = (custom)");
            }
            println!();

            println!("[worker]");
            println!(
                "  exit_poll_interval_secs = {}",
                toml.worker.exit_poll_interval_secs
            );
            println!(
                "  exit_poll_timeout_secs = {}",
                toml.worker.exit_poll_timeout_secs
            );
            println!("  shutdown_grace_secs = {}", toml.worker.shutdown_grace_secs);
            println!("  store_timeout_secs = {}", toml.worker.store_timeout_secs);
            println!("  mail_batch_limit = {}", toml.worker.mail_batch_limit);
            println!();

            println!("[service]");
            println!("  sweep_interval_secs = {}", toml.service.sweep_interval_secs);
            println!(
                "  terminal_max_age_secs = {}",
                toml.service.terminal_max_age_secs
            );
            println!();

            println!("[permissions]");
            for prefix in &toml.permissions.scratch_prefixes {
                println!("  scratch prefix: {}", prefix.display());
            }
            if !toml.permissions.extra_allowed_tools.is_empty() {
                println!(
                    "  extra_allowed_tools = {:?}",
                    toml.permissions.extra_allowed_tools
                );
            }
            println!();

            println!("Effective values (with env overrides):");
            println!("  claude_cmd = \"{}\"", toml.claude_cmd());
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No gatekeeper.toml found. Using defaults (valid).");
                return Ok(());
            }

            let toml = GatekeeperToml::load(&config_path)?;
            let warnings = toml.validate();

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
    }

    Ok(())
}
