//! Administrative operations: thin request/response wrappers over the
//! dispatcher and the store.

use std::path::PathBuf;

use anyhow::Context;
use gatekeeper_common::IssueStatus;
use tracing::info;

use super::ReviewService;
use crate::errors::ServiceError;
use crate::fsm::{ReviewEvent, ReviewState};
use crate::reviewer::prompts::{DiffCommand, is_valid_revision};
use crate::store::{
    Activity, NewReview, Priority, Review, ReviewFilter, ReviewIssue, ReviewIteration,
};

/// A review request.
#[derive(Debug, Clone, Default)]
pub struct CreateReview {
    pub requester_id: String,
    pub repo_path: PathBuf,
    pub branch: Option<String>,
    pub base_branch: Option<String>,
    pub commit_sha: Option<String>,
    /// A persona name (`security`, `performance`, ...) or any other label.
    pub review_type: Option<String>,
    pub priority: Priority,
    pub thread_id: Option<String>,
}

fn check_revision(label: &str, rev: Option<&str>) -> Result<(), ServiceError> {
    match rev {
        Some(rev) if !is_valid_revision(rev) => Err(ServiceError::InvalidRequest(format!(
            "{} '{}' is not a valid git revision",
            label, rev
        ))),
        _ => Ok(()),
    }
}

impl ReviewService {
    /// Store a new review and submit it, which spawns its reviewer.
    pub async fn create_review(&self, req: CreateReview) -> Result<Review, ServiceError> {
        if req.requester_id.trim().is_empty() {
            return Err(ServiceError::InvalidRequest(
                "requester id must not be empty".to_string(),
            ));
        }
        check_revision("branch", req.branch.as_deref())?;
        check_revision("base branch", req.base_branch.as_deref())?;
        check_revision("commit", req.commit_sha.as_deref())?;
        let repo_path = req.repo_path.canonicalize().map_err(|e| {
            ServiceError::InvalidRequest(format!(
                "repository {} is not accessible: {}",
                req.repo_path.display(),
                e
            ))
        })?;
        if !repo_path.is_dir() {
            return Err(ServiceError::InvalidRequest(format!(
                "repository {} is not a directory",
                repo_path.display()
            )));
        }

        let requester_id = req.requester_id.clone();
        let new = NewReview {
            thread_id: req.thread_id,
            requester_id: req.requester_id,
            branch: req.branch,
            base_branch: req.base_branch,
            commit_sha: req.commit_sha,
            repo_path: repo_path.to_string_lossy().into_owned(),
            review_type: req.review_type.unwrap_or_else(|| "full".to_string()),
            priority: req.priority,
        };
        let review = self.db(move |db| db.create_review(&new)).await?;
        info!(review_id = %review.id, requester = %review.requester_id, "Review created");

        self.process_event(&review.id, ReviewEvent::SubmitForReview { requester_id })
            .await?;
        self.get_review(&review.id).await
    }

    pub async fn get_review(&self, review_id: &str) -> Result<Review, ServiceError> {
        let id = review_id.to_string();
        self.db(move |db| db.get_review(&id))
            .await?
            .ok_or_else(|| ServiceError::ReviewNotFound {
                id: review_id.to_string(),
            })
    }

    pub async fn list_reviews(&self, filter: ReviewFilter) -> Result<Vec<Review>, ServiceError> {
        self.db(move |db| db.list_reviews(&filter)).await
    }

    /// Ask for another round after changes were requested. Mails the live
    /// reviewer or starts a new one.
    pub async fn resubmit(
        &self,
        review_id: &str,
        new_commit_sha: Option<String>,
    ) -> Result<ReviewState, ServiceError> {
        check_revision("commit", new_commit_sha.as_deref())?;
        self.process_event(review_id, ReviewEvent::Resubmit { new_commit_sha })
            .await
    }

    pub async fn cancel(&self, review_id: &str, reason: &str) -> Result<ReviewState, ServiceError> {
        self.process_event(
            review_id,
            ReviewEvent::Cancel {
                reason: reason.to_string(),
            },
        )
        .await
    }

    /// Start a fresh reviewer for a review whose last round failed. Only
    /// valid while a reviewer is expected and none is running.
    pub async fn retry(&self, review_id: &str) -> Result<ReviewState, ServiceError> {
        let state = self.current_state(review_id).await?;
        if !matches!(
            state,
            ReviewState::PendingReview | ReviewState::UnderReview | ReviewState::ReReview
        ) {
            return Err(ServiceError::InvalidRequest(format!(
                "review {} is {} and has nothing to retry",
                review_id, state
            )));
        }
        if self.inner.supervisor.is_alive(review_id).await {
            return Err(ServiceError::InvalidRequest(format!(
                "review {} already has a running reviewer",
                review_id
            )));
        }
        self.spawn_reviewer(review_id).await?;
        Ok(state)
    }

    /// Stop any reviewer and remove the review with its history.
    pub async fn delete_review(&self, review_id: &str) -> Result<(), ServiceError> {
        self.inner.supervisor.stop_reviewer(review_id).await;
        self.evict(review_id).await;
        let id = review_id.to_string();
        if !self.db(move |db| db.delete_review(&id)).await? {
            return Err(ServiceError::ReviewNotFound {
                id: review_id.to_string(),
            });
        }
        info!(review_id = %review_id, "Review deleted");
        Ok(())
    }

    pub async fn list_issues(
        &self,
        review_id: &str,
        status: Option<IssueStatus>,
    ) -> Result<Vec<ReviewIssue>, ServiceError> {
        self.get_review(review_id).await?;
        let id = review_id.to_string();
        self.db(move |db| db.list_issues(&id, status)).await
    }

    pub async fn update_issue_status(
        &self,
        issue_id: i64,
        status: IssueStatus,
    ) -> Result<ReviewIssue, ServiceError> {
        self.db(move |db| db.update_issue_status(issue_id, status))
            .await?
            .ok_or(ServiceError::IssueNotFound { id: issue_id })
    }

    pub async fn list_iterations(
        &self,
        review_id: &str,
    ) -> Result<Vec<ReviewIteration>, ServiceError> {
        let id = review_id.to_string();
        self.db(move |db| db.list_iterations(&id)).await
    }

    pub async fn list_activities(&self, review_id: &str) -> Result<Vec<Activity>, ServiceError> {
        let id = review_id.to_string();
        self.db(move |db| db.list_activities(&id)).await
    }

    /// The diff the reviewer is asked to look at, produced by running the
    /// same git command in the review's repository.
    pub async fn review_diff(&self, review_id: &str) -> Result<String, ServiceError> {
        let review = self.get_review(review_id).await?;
        let diff = DiffCommand::for_target(
            review.branch.as_deref(),
            review.base_branch.as_deref(),
            review.commit_sha.as_deref(),
            &self.inner.options.reviewer.ignore_patterns,
        );
        let output = tokio::process::Command::new(diff.program())
            .args(diff.args())
            .current_dir(&review.repo_path)
            .output()
            .await
            .with_context(|| format!("Failed to run {}", diff.display()))?;
        if !output.status.success() {
            return Err(ServiceError::Other(anyhow::anyhow!(
                "{} failed: {}",
                diff.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
