//! Tool permission policy for reviewer agents.
//!
//! Every tool call the agent subprocess wants to make arrives as a
//! `can_use_tool` control request and is answered from
//! [`PermissionPolicy::evaluate`]. Denials are ordinary answers handed back to
//! the agent so it can adapt, not errors.
//!
//! | Tool | Decision |
//! |------|----------|
//! | `Read`, `Glob`, `Grep`, `LS`, `NotebookRead`, `TodoWrite` | allow |
//! | `Edit`, `MultiEdit`, `NotebookEdit`, `WebFetch`, `WebSearch`, `KillShell` | deny |
//! | `Write` | allow only under a scratch prefix |
//! | `Bash` | [`classify_command`] |
//! | anything else | deny |

mod command;

pub use command::classify_command;

use serde_json::Value;
use std::path::{Component, Path, PathBuf};

/// Default scratch directory reviewers may write review notes into.
pub const DEFAULT_SCRATCH_PREFIX: &str = "/tmp/gatekeeper";

const READ_ONLY_TOOLS: &[&str] = &["Read", "Glob", "Grep", "LS", "NotebookRead", "TodoWrite"];

const MUTATION_TOOLS: &[&str] = &[
    "Edit",
    "MultiEdit",
    "NotebookEdit",
    "WebFetch",
    "WebSearch",
    "KillShell",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionDecision {
    Allow,
    Deny(String),
}

impl PermissionDecision {
    pub fn deny(reason: impl Into<String>) -> Self {
        Self::Deny(reason.into())
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Stateless policy consulted before every tool invocation.
#[derive(Debug, Clone)]
pub struct PermissionPolicy {
    scratch_prefixes: Vec<PathBuf>,
    extra_allowed_tools: Vec<String>,
}

impl Default for PermissionPolicy {
    fn default() -> Self {
        Self::new(vec![PathBuf::from(DEFAULT_SCRATCH_PREFIX)], Vec::new())
    }
}

impl PermissionPolicy {
    /// Relative scratch prefixes are ignored; they would make the `Write`
    /// check depend on the agent's working directory.
    pub fn new(scratch_prefixes: Vec<PathBuf>, extra_allowed_tools: Vec<String>) -> Self {
        let scratch_prefixes = scratch_prefixes
            .iter()
            .filter_map(|p| clean_absolute(p))
            .collect();
        Self {
            scratch_prefixes,
            extra_allowed_tools,
        }
    }

    pub fn with_scratch_prefix(mut self, prefix: impl AsRef<Path>) -> Self {
        if let Some(cleaned) = clean_absolute(prefix.as_ref()) {
            self.scratch_prefixes.push(cleaned);
        }
        self
    }

    pub fn scratch_prefixes(&self) -> &[PathBuf] {
        &self.scratch_prefixes
    }

    pub fn evaluate(&self, tool_name: &str, input: &Value) -> PermissionDecision {
        if READ_ONLY_TOOLS.contains(&tool_name)
            || self.extra_allowed_tools.iter().any(|t| t == tool_name)
        {
            return PermissionDecision::Allow;
        }

        if MUTATION_TOOLS.contains(&tool_name) {
            return PermissionDecision::deny(format!(
                "{} is not available to reviewers; report issues in the review result instead",
                tool_name
            ));
        }

        match tool_name {
            "Write" => self.evaluate_write(input),
            "Bash" => match input.get("command").and_then(|v| v.as_str()) {
                Some(cmd) => classify_command(cmd),
                None => PermissionDecision::deny("Bash request has no command"),
            },
            other => PermissionDecision::deny(format!("Unknown tool '{}' is not allowed", other)),
        }
    }

    fn evaluate_write(&self, input: &Value) -> PermissionDecision {
        let Some(raw) = input.get("file_path").and_then(|v| v.as_str()) else {
            return PermissionDecision::deny("Write request has no file_path");
        };
        let Some(target) = clean_absolute(Path::new(raw)) else {
            return PermissionDecision::deny(format!("Write path '{}' must be absolute", raw));
        };
        if self
            .scratch_prefixes
            .iter()
            .any(|prefix| target.starts_with(prefix) && target != *prefix)
        {
            PermissionDecision::Allow
        } else {
            PermissionDecision::deny(format!(
                "Writes are only allowed under {}",
                self.scratch_prefixes
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
        }
    }
}

/// Lexically resolve `.` and `..` in an absolute path. Returns `None` for
/// relative paths. `..` at the root stays at the root.
fn clean_absolute(path: &Path) -> Option<PathBuf> {
    if !path.is_absolute() {
        return None;
    }
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(p) => cleaned.push(p.as_os_str()),
            Component::RootDir => cleaned.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                cleaned.pop();
            }
            Component::Normal(part) => cleaned.push(part),
        }
    }
    Some(cleaned)
}
