//! Permission policy probe: `gatekeeper check-tool`.

use anyhow::{Context, Result};
use serde_json::{Value, json};
use std::path::Path;

use gatekeeper::config::{GATEKEEPER_DIR, GatekeeperToml};
use gatekeeper::permissions::PermissionDecision;

pub fn cmd_check_tool(
    project_dir: &Path,
    tool: &str,
    command: Option<&str>,
    file_path: Option<&str>,
    raw_input: Option<&str>,
) -> Result<()> {
    let toml = GatekeeperToml::load_or_default(&project_dir.join(GATEKEEPER_DIR))?;
    let policy = toml.permissions.policy();

    let input: Value = match raw_input {
        Some(raw) => serde_json::from_str(raw).context("--input is not valid JSON")?,
        None => {
            let mut input = json!({});
            if let Some(command) = command {
                input["command"] = json!(command);
            }
            if let Some(path) = file_path {
                input["file_path"] = json!(path);
            }
            input
        }
    };

    match policy.evaluate(tool, &input) {
        PermissionDecision::Allow => println!("{}", console::style("allow").green().bold()),
        PermissionDecision::Deny(reason) => {
            println!("{}: {}", console::style("deny").red().bold(), reason)
        }
    }
    Ok(())
}
