//! Configuration for Gatekeeper, read from `.gatekeeper/gatekeeper.toml`.
//!
//! Every field has a default, so a missing file or an empty file is a valid
//! configuration. `CLAUDE_CMD` in the environment overrides `[claude]`.
//!
//! # Configuration File Format
//!
//! ```toml
//! [claude]
//! claude_cmd = "claude"
//!
//! [reviewer]
//! name = "security"
//! model = "claude-sonnet-4-5"
//! focus_areas = ["Unsafe FFI"]
//! ignore_patterns = ["*.lock", "vendor/**"]
//!
//! [worker]
//! exit_poll_interval_secs = 5
//! exit_poll_timeout_secs = 600
//! shutdown_grace_secs = 10
//! store_timeout_secs = 5
//! mail_batch_limit = 10
//!
//! [service]
//! sweep_interval_secs = 300
//! terminal_max_age_secs = 1800
//!
//! [permissions]
//! scratch_prefixes = ["/tmp/gatekeeper"]
//! extra_allowed_tools = []
//!
//! [logging]
//! level = "info"
//! json = false
//! ```

use anyhow::{Context, Result};
use gatekeeper_common::{Persona, ReviewerConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::permissions::{DEFAULT_SCRATCH_PREFIX, PermissionPolicy};

/// Name of the per-project state directory.
pub const GATEKEEPER_DIR: &str = ".gatekeeper";

const CONFIG_FILE: &str = "gatekeeper.toml";

/// Claude CLI integration settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClaudeSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claude_cmd: Option<String>,
}

/// Reviewer worker timing and limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSection {
    /// How often the exit-poll loop checks for re-review mail.
    #[serde(default = "default_exit_poll_interval")]
    pub exit_poll_interval_secs: u64,
    /// How long a finished session waits for mail before exiting.
    #[serde(default = "default_exit_poll_timeout")]
    pub exit_poll_timeout_secs: u64,
    /// Grace period between closing the agent's stdin and killing it.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
    /// Bound on each store call made from the poll loop.
    #[serde(default = "default_store_timeout")]
    pub store_timeout_secs: u64,
    /// Maximum unread messages fetched per poll.
    #[serde(default = "default_mail_batch_limit")]
    pub mail_batch_limit: u32,
}

fn default_exit_poll_interval() -> u64 {
    5
}

fn default_exit_poll_timeout() -> u64 {
    600
}

fn default_shutdown_grace() -> u64 {
    10
}

fn default_store_timeout() -> u64 {
    5
}

fn default_mail_batch_limit() -> u32 {
    10
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self {
            exit_poll_interval_secs: default_exit_poll_interval(),
            exit_poll_timeout_secs: default_exit_poll_timeout(),
            shutdown_grace_secs: default_shutdown_grace(),
            store_timeout_secs: default_store_timeout(),
            mail_batch_limit: default_mail_batch_limit(),
        }
    }
}

impl WorkerSection {
    pub fn exit_poll_interval(&self) -> Duration {
        Duration::from_secs(self.exit_poll_interval_secs)
    }

    pub fn exit_poll_timeout(&self) -> Duration {
        Duration::from_secs(self.exit_poll_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }
}

/// Dispatcher housekeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSection {
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    /// Terminal FSMs older than this are evicted from memory by the sweep.
    #[serde(default = "default_terminal_max_age")]
    pub terminal_max_age_secs: u64,
}

fn default_sweep_interval() -> u64 {
    300
}

fn default_terminal_max_age() -> u64 {
    1800
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval(),
            terminal_max_age_secs: default_terminal_max_age(),
        }
    }
}

impl ServiceSection {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn terminal_max_age(&self) -> Duration {
        Duration::from_secs(self.terminal_max_age_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionsSection {
    /// Absolute directories the agent's `Write` tool may write under.
    #[serde(default = "default_scratch_prefixes")]
    pub scratch_prefixes: Vec<PathBuf>,
    /// Tools allowed in addition to the built-in read-only set.
    #[serde(default)]
    pub extra_allowed_tools: Vec<String>,
}

fn default_scratch_prefixes() -> Vec<PathBuf> {
    vec![PathBuf::from(DEFAULT_SCRATCH_PREFIX)]
}

impl Default for PermissionsSection {
    fn default() -> Self {
        Self {
            scratch_prefixes: default_scratch_prefixes(),
            extra_allowed_tools: Vec::new(),
        }
    }
}

impl PermissionsSection {
    pub fn policy(&self) -> PermissionPolicy {
        PermissionPolicy::new(
            self.scratch_prefixes.clone(),
            self.extra_allowed_tools.clone(),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Default filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines on stderr instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Root of `gatekeeper.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatekeeperToml {
    #[serde(default)]
    pub claude: ClaudeSection,
    #[serde(default)]
    pub reviewer: ReviewerConfig,
    #[serde(default)]
    pub worker: WorkerSection,
    #[serde(default)]
    pub service: ServiceSection,
    #[serde(default)]
    pub permissions: PermissionsSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl GatekeeperToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse gatekeeper.toml")
    }

    /// Load `gatekeeper.toml` from the state directory, or defaults if absent.
    pub fn load_or_default(gatekeeper_dir: &Path) -> Result<Self> {
        let config_path = gatekeeper_dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize gatekeeper.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Get the Claude command, with fallback to environment variable.
    pub fn claude_cmd(&self) -> String {
        std::env::var("CLAUDE_CMD")
            .ok()
            .filter(|c| !c.trim().is_empty())
            .or_else(|| self.claude.claude_cmd.clone())
            .unwrap_or_else(|| "claude".to_string())
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let worker = &self.worker;

        if worker.exit_poll_interval_secs == 0 {
            warnings.push("worker.exit_poll_interval_secs is 0; polling would spin".to_string());
        }
        if worker.exit_poll_timeout_secs > 0
            && worker.exit_poll_interval_secs >= worker.exit_poll_timeout_secs
        {
            warnings.push(format!(
                "worker.exit_poll_interval_secs ({}) is not shorter than exit_poll_timeout_secs ({}); mail will be checked at most once",
                worker.exit_poll_interval_secs, worker.exit_poll_timeout_secs
            ));
        }
        if worker.store_timeout_secs == 0 {
            warnings.push("worker.store_timeout_secs is 0; every store call will time out".to_string());
        }
        if worker.mail_batch_limit == 0 {
            warnings.push("worker.mail_batch_limit is 0; re-review mail will never be read".to_string());
        }
        if self.service.sweep_interval_secs == 0 {
            warnings.push("service.sweep_interval_secs is 0; sweep disabled".to_string());
        }

        for prefix in &self.permissions.scratch_prefixes {
            if !prefix.is_absolute() {
                warnings.push(format!(
                    "permissions.scratch_prefixes entry '{}' is relative and will be ignored",
                    prefix.display()
                ));
            }
        }

        if Persona::from_name(&self.reviewer.name).is_none() {
            warnings.push(format!(
                "Unknown reviewer '{}'; using the general persona",
                self.reviewer.name
            ));
        }
        if self.reviewer.model.trim().is_empty() {
            warnings.push("reviewer.model is empty".to_string());
        }

        warnings
    }
}

/// Resolved configuration for one project.
#[derive(Debug, Clone)]
pub struct GatekeeperConfig {
    pub project_dir: PathBuf,
    pub gatekeeper_dir: PathBuf,
    pub toml: GatekeeperToml,
}

impl GatekeeperConfig {
    pub fn new(project_dir: PathBuf) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let gatekeeper_dir = project_dir.join(GATEKEEPER_DIR);
        let toml = GatekeeperToml::load_or_default(&gatekeeper_dir)?;

        Ok(Self {
            project_dir,
            gatekeeper_dir,
            toml,
        })
    }

    pub fn claude_cmd(&self) -> String {
        self.toml.claude_cmd()
    }

    pub fn config_file(&self) -> PathBuf {
        self.gatekeeper_dir.join(CONFIG_FILE)
    }

    pub fn db_path(&self) -> PathBuf {
        self.gatekeeper_dir.join("gatekeeper.db")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.gatekeeper_dir.join("logs")
    }

    pub fn validate(&self) -> Vec<String> {
        self.toml.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = GatekeeperToml::parse("").unwrap();
        assert_eq!(config.worker.exit_poll_interval_secs, 5);
        assert_eq!(config.worker.exit_poll_timeout_secs, 600);
        assert_eq!(config.worker.shutdown_grace_secs, 10);
        assert_eq!(config.worker.store_timeout_secs, 5);
        assert_eq!(config.worker.mail_batch_limit, 10);
        assert_eq!(config.service.sweep_interval_secs, 300);
        assert_eq!(config.service.terminal_max_age_secs, 1800);
        assert_eq!(
            config.permissions.scratch_prefixes,
            vec![PathBuf::from("/tmp/gatekeeper")]
        );
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.reviewer.name, "general");
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let content = r#"
[claude]
claude_cmd = "/opt/claude"

[reviewer]
name = "security"
model = "claude-opus-4"
focus_areas = ["Unsafe FFI"]
system_prompt = "Be brief."

[worker]
exit_poll_interval_secs = 1
exit_poll_timeout_secs = 30

[permissions]
scratch_prefixes = ["/var/tmp/gk"]
extra_allowed_tools = ["mcp__mail__send"]

[logging]
level = "debug"
json = true
"#;
        let config = GatekeeperToml::parse(content).unwrap();
        assert_eq!(config.claude.claude_cmd.as_deref(), Some("/opt/claude"));
        assert_eq!(config.reviewer.persona(), Persona::Security);
        assert_eq!(config.reviewer.system_prompt.as_deref(), Some("Be brief."));
        assert_eq!(config.worker.exit_poll_timeout(), Duration::from_secs(30));
        assert_eq!(config.worker.shutdown_grace_secs, 10);
        assert_eq!(config.permissions.extra_allowed_tools, vec!["mcp__mail__send"]);
        assert!(config.logging.json);
    }

    #[test]
    fn test_validate_reports_problems() {
        let content = r#"
[reviewer]
name = "astrologer"

[worker]
exit_poll_interval_secs = 60
exit_poll_timeout_secs = 30
mail_batch_limit = 0

[permissions]
scratch_prefixes = ["scratch"]
"#;
        let warnings = GatekeeperToml::parse(content).unwrap().validate();
        assert_eq!(warnings.len(), 4, "{:?}", warnings);
        assert!(warnings.iter().any(|w| w.contains("astrologer")));
        assert!(warnings.iter().any(|w| w.contains("scratch")));
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        assert!(GatekeeperToml::parse("[worker\nexit_poll_interval_secs = ").is_err());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gatekeeper.toml");
        let mut config = GatekeeperToml::default();
        config.reviewer.name = "performance".into();
        config.worker.exit_poll_timeout_secs = 42;
        config.save(&path).unwrap();

        let loaded = GatekeeperToml::load(&path).unwrap();
        assert_eq!(loaded.reviewer.name, "performance");
        assert_eq!(loaded.worker.exit_poll_timeout_secs, 42);
    }

    #[test]
    fn test_load_or_default_without_file() {
        let dir = tempdir().unwrap();
        let config = GatekeeperToml::load_or_default(dir.path()).unwrap();
        assert_eq!(config.reviewer.model, gatekeeper_common::DEFAULT_REVIEWER_MODEL);
    }

    #[test]
    fn test_gatekeeper_config_paths() {
        let dir = tempdir().unwrap();
        let config = GatekeeperConfig::new(dir.path().to_path_buf()).unwrap();
        assert!(config.gatekeeper_dir.ends_with(".gatekeeper"));
        assert!(config.db_path().ends_with(".gatekeeper/gatekeeper.db"));
        assert!(config.log_dir().ends_with(".gatekeeper/logs"));
    }

    #[test]
    fn test_policy_from_permissions_section() {
        let section = PermissionsSection::default();
        let policy = section.policy();
        let input = serde_json::json!({"file_path": "/tmp/gatekeeper/r/notes.md"});
        assert!(policy.evaluate("Write", &input).is_allowed());
    }
}
