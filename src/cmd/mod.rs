//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module    | Commands handled                                           |
//! |-----------|-------------------------------------------------------------|
//! | `project` | `Init`                                                      |
//! | `config`  | `Config`                                                    |
//! | `tool`    | `CheckTool`                                                 |
//! | `review`  | `Review`, `Resubmit`, `Cancel`, `Retry`, `Delete`, `Diff`   |
//! | `query`   | `List`, `Show`, `Issues`, `ResolveIssue`                    |
//!
//! Commands that touch reviews share one [`App`]: the loaded configuration,
//! logging, and a running [`ReviewService`] over the project database.

pub mod config;
pub mod project;
pub mod query;
pub mod review;
pub mod tool;

pub use config::cmd_config;
pub use project::cmd_init;
pub use tool::cmd_check_tool;

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

use gatekeeper::config::GatekeeperConfig;
use gatekeeper::logging::{self, LoggingGuard};
use gatekeeper::notify::StateNotifier;
use gatekeeper::reviewer::ClaudeLauncher;
use gatekeeper::service::{ReviewService, ServiceOptions};
use gatekeeper::store::{DbHandle, ReviewDb};

use super::Commands;

pub struct App {
    pub config: GatekeeperConfig,
    pub service: ReviewService,
    _logging: LoggingGuard,
}

impl App {
    pub fn open(project_dir: &Path, verbose: bool) -> Result<Self> {
        let config = GatekeeperConfig::new(project_dir.to_path_buf())?;
        let guard = logging::init(&config.toml.logging, &config.log_dir(), verbose)?;
        for warning in config.validate() {
            tracing::warn!("{}", warning);
        }

        let db = DbHandle::new(ReviewDb::new(&config.db_path())?);
        let service = ReviewService::start(
            db,
            StateNotifier::new(),
            Arc::new(ClaudeLauncher),
            ServiceOptions::from_config(&config.toml),
        );
        Ok(Self {
            config,
            service,
            _logging: guard,
        })
    }

    /// Stop any reviewers this process started.
    pub async fn close(&self) {
        self.service.shutdown().await;
    }
}

pub async fn run_review_command(app: &App, command: &Commands) -> Result<()> {
    match command {
        Commands::Review {
            repo,
            branch,
            base,
            commit,
            review_type,
            priority,
            requester,
            thread,
            wait,
        } => {
            let request = review::ReviewRequest {
                repo: repo
                    .clone()
                    .unwrap_or_else(|| app.config.project_dir.clone()),
                branch: branch.clone(),
                base: base.clone(),
                commit: commit.clone(),
                review_type: review_type.clone(),
                priority,
                requester,
                thread: thread.clone(),
            };
            review::cmd_review(app, request, *wait).await
        }
        Commands::Resubmit {
            review_id,
            commit,
            wait,
        } => review::cmd_resubmit(app, review_id, commit.clone(), *wait).await,
        Commands::Cancel { review_id, reason } => review::cmd_cancel(app, review_id, reason).await,
        Commands::Retry { review_id, wait } => review::cmd_retry(app, review_id, *wait).await,
        Commands::Delete { review_id } => review::cmd_delete(app, review_id).await,
        Commands::Diff { review_id } => review::cmd_diff(app, review_id).await,
        Commands::List {
            state,
            requester,
            limit,
        } => query::cmd_list(app, state.as_deref(), requester.clone(), *limit).await,
        Commands::Show { review_id } => query::cmd_show(app, review_id).await,
        Commands::Issues { review_id, status } => {
            query::cmd_issues(app, review_id, status.as_deref()).await
        }
        Commands::ResolveIssue { issue_id, reopen } => {
            query::cmd_resolve_issue(app, *issue_id, *reopen).await
        }
        Commands::Init | Commands::Config { .. } | Commands::CheckTool { .. } => {
            anyhow::bail!("command does not use the review service")
        }
    }
}
