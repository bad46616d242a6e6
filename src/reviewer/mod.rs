//! Reviewer agents.
//!
//! The [`ReviewerSupervisor`] runs at most one [`worker`] per review. Each
//! worker owns one agent session ([`session`]), answers its tool permission
//! requests, captures the structured result ([`capture`]) and reports back
//! through a [`WorkerReport`] channel that the review service consumes.

pub mod capture;
pub mod prompts;
pub mod result;
pub mod session;
pub mod supervisor;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

use std::path::PathBuf;
use std::time::Duration;

use gatekeeper_common::{Persona, ReviewerConfig, ReviewerResult};

use crate::config::GatekeeperToml;
use crate::errors::ReviewerError;
use crate::permissions::DEFAULT_SCRATCH_PREFIX;
use crate::store::Review;

pub use session::{AgentSession, ClaudeLauncher, LaunchSpec, SessionLauncher, SessionMessage};
pub use supervisor::ReviewerSupervisor;

/// What a worker needs to know about the review it serves.
#[derive(Debug, Clone)]
pub struct ReviewContext {
    pub review_id: String,
    pub thread_id: String,
    pub repo_path: PathBuf,
    pub branch: Option<String>,
    pub base_branch: Option<String>,
    pub commit_sha: Option<String>,
    pub reviewer: ReviewerConfig,
}

impl ReviewContext {
    /// A review whose type names a persona gets that persona; any other type
    /// uses the configured reviewer.
    pub fn from_review(review: &Review, configured: &ReviewerConfig) -> Self {
        let reviewer = match Persona::from_name(&review.review_type) {
            Some(persona) if persona != configured.persona() => ReviewerConfig {
                name: persona.as_str().to_string(),
                system_prompt: None,
                ..configured.clone()
            },
            _ => configured.clone(),
        };
        Self {
            review_id: review.id.clone(),
            thread_id: review.thread_id.clone(),
            repo_path: PathBuf::from(&review.repo_path),
            branch: review.branch.clone(),
            base_branch: review.base_branch.clone(),
            commit_sha: review.commit_sha.clone(),
            reviewer,
        }
    }
}

/// Messages from workers to the review service.
#[derive(Debug)]
pub enum WorkerReport {
    /// A prompt was sent and the agent is reviewing.
    RoundStarted {
        review_id: String,
        reviewer_id: String,
    },
    /// A round produced a decision or failed.
    RoundCompleted {
        review_id: String,
        reviewer_id: String,
        outcome: Result<ReviewerResult, ReviewerError>,
    },
}

impl WorkerReport {
    pub fn review_id(&self) -> &str {
        match self {
            Self::RoundStarted { review_id, .. } | Self::RoundCompleted { review_id, .. } => {
                review_id
            }
        }
    }
}

/// Runtime settings shared by all workers.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub claude_cmd: String,
    pub exit_poll_interval: Duration,
    pub exit_poll_timeout: Duration,
    pub shutdown_grace: Duration,
    pub store_timeout: Duration,
    pub mail_batch_limit: u32,
    /// Per-worker write-up directories are created under here.
    pub scratch_root: PathBuf,
    /// Per-worker agent configuration directories are created under here.
    /// Kept apart from `scratch_root` so the agent cannot write its own
    /// settings.
    pub config_root: PathBuf,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self::from_config(&GatekeeperToml::default())
    }
}

impl WorkerSettings {
    pub fn from_config(toml: &GatekeeperToml) -> Self {
        let scratch_root = toml
            .permissions
            .scratch_prefixes
            .iter()
            .find(|p| p.is_absolute())
            .cloned()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SCRATCH_PREFIX));
        Self {
            claude_cmd: toml.claude_cmd(),
            exit_poll_interval: toml.worker.exit_poll_interval(),
            exit_poll_timeout: toml.worker.exit_poll_timeout(),
            shutdown_grace: toml.worker.shutdown_grace(),
            store_timeout: toml.worker.store_timeout(),
            mail_batch_limit: toml.worker.mail_batch_limit,
            scratch_root,
            config_root: std::env::temp_dir().join("gatekeeper-config"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsm::ReviewState;
    use crate::store::Priority;

    fn review(review_type: &str) -> Review {
        Review {
            id: "rev-1".into(),
            thread_id: "thread-1".into(),
            requester_id: "alice".into(),
            branch: Some("feature".into()),
            base_branch: Some("main".into()),
            commit_sha: None,
            repo_path: "/repo".into(),
            review_type: review_type.into(),
            priority: Priority::Medium,
            state: ReviewState::PendingReview,
            created_at: String::new(),
            updated_at: String::new(),
            completed_at: None,
        }
    }

    #[test]
    fn test_review_type_selects_persona() {
        let configured = ReviewerConfig::default().with_model("claude-opus-4-1");
        let ctx = ReviewContext::from_review(&review("security"), &configured);
        assert_eq!(ctx.reviewer.persona(), Persona::Security);
        assert_eq!(ctx.reviewer.model, "claude-opus-4-1");
        assert_eq!(ctx.branch.as_deref(), Some("feature"));
    }

    #[test]
    fn test_plain_review_type_uses_configured_reviewer() {
        let configured = ReviewerConfig::for_persona(Persona::Performance);
        let ctx = ReviewContext::from_review(&review("full"), &configured);
        assert_eq!(ctx.reviewer, configured);
    }

    #[test]
    fn test_settings_from_default_config() {
        let settings = WorkerSettings::default();
        assert_eq!(settings.scratch_root, PathBuf::from(DEFAULT_SCRATCH_PREFIX));
        assert!(!settings.config_root.starts_with(&settings.scratch_root));
        assert!(settings.exit_poll_interval < settings.exit_poll_timeout);
    }
}
