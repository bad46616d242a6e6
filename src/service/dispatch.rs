//! Outbox interpreter.

use tracing::{debug, info};

use super::ReviewService;
use crate::errors::ServiceError;
use crate::fsm::{OutboxEvent, ReviewEnv};
use crate::reviewer::ReviewContext;

const RESUBMIT_SUBJECT: &str = "Re-review requested";

impl ReviewService {
    /// Apply outbox events in order. Stops at the first failure.
    pub(super) async fn dispatch(
        &self,
        env: &ReviewEnv,
        outbox: Vec<OutboxEvent>,
    ) -> Result<(), ServiceError> {
        for event in outbox {
            debug!(review_id = %env.review_id, kind = event.name(), "Dispatching outbox event");
            match event {
                OutboxEvent::PersistReviewState {
                    review_id,
                    new_state,
                } => {
                    let id = review_id.clone();
                    let updated = if new_state.is_terminal() {
                        self.db(move |db| db.complete_review(&id, new_state)).await?
                    } else {
                        self.db(move |db| db.update_review_state(&id, new_state))
                            .await?
                    };
                    if !updated {
                        return Err(ServiceError::ReviewNotFound { id: review_id });
                    }
                }
                OutboxEvent::NotifyReviewStateChange {
                    review_id,
                    old_state,
                    new_state,
                } => {
                    self.inner
                        .notifier
                        .state_changed(&review_id, old_state, new_state);
                }
                OutboxEvent::SpawnReviewerAgent { review_id, .. } => {
                    self.spawn_reviewer(&review_id).await?;
                }
                OutboxEvent::SendMailToReviewer {
                    review_id,
                    thread_id,
                    new_commit_sha,
                } => {
                    self.send_mail_to_reviewer(env, &review_id, &thread_id, new_commit_sha)
                        .await?;
                }
                // Iterations and issues are written by the worker when it
                // captures a result; these events only mark the decision.
                OutboxEvent::CreateReviewIteration {
                    review_id,
                    reviewer_id,
                    decision,
                } => {
                    debug!(
                        review_id = %review_id,
                        reviewer = %reviewer_id,
                        decision = decision.as_str(),
                        "Iteration recorded by reviewer"
                    );
                }
                OutboxEvent::CreateReviewIssues {
                    review_id, issues, ..
                } => {
                    debug!(review_id = %review_id, count = issues.len(), "Issues recorded by reviewer");
                }
                OutboxEvent::RecordActivity {
                    review_id,
                    kind,
                    description,
                } => {
                    self.db(move |db| db.create_activity(&review_id, kind, &description))
                        .await?;
                }
            }
        }
        Ok(())
    }

    /// Start a reviewer for the review as it is stored now. The supervisor
    /// ignores the request if one is already running.
    pub(super) async fn spawn_reviewer(&self, review_id: &str) -> Result<(), ServiceError> {
        let id = review_id.to_string();
        let review = self
            .db(move |db| db.get_review(&id))
            .await?
            .ok_or_else(|| ServiceError::ReviewNotFound {
                id: review_id.to_string(),
            })?;
        let ctx = ReviewContext::from_review(&review, &self.inner.options.reviewer);
        self.inner.supervisor.spawn_reviewer(ctx).await;
        Ok(())
    }

    /// Mail the live reviewer, or start a fresh one if none is running.
    /// A worker exiting between the check and the write leaves an unread
    /// message behind; the next resubmit spawns a new worker.
    async fn send_mail_to_reviewer(
        &self,
        env: &ReviewEnv,
        review_id: &str,
        thread_id: &str,
        new_commit_sha: Option<String>,
    ) -> Result<(), ServiceError> {
        if let Some(sha) = new_commit_sha.clone() {
            let id = review_id.to_string();
            self.db(move |db| db.update_review_commit(&id, &sha)).await?;
        }

        let Some(agent) = self.inner.supervisor.agent_name(review_id).await else {
            info!(review_id = %review_id, "No live reviewer; spawning a fresh one");
            return self.spawn_reviewer(review_id).await;
        };

        let body = match &new_commit_sha {
            Some(sha) => format!(
                "The author pushed new changes (commit {}). Please review again.",
                sha
            ),
            None => "The author addressed your feedback. Please review again.".to_string(),
        };
        let sender = env.requester_id.clone();
        let recipient = agent.clone();
        let thread = thread_id.to_string();
        let message_id = self
            .db(move |db| {
                db.deliver_mail(&sender, &recipient, Some(&thread), RESUBMIT_SUBJECT, &body)
            })
            .await?;
        info!(review_id = %review_id, agent = %agent, message_id, "Mailed live reviewer");
        Ok(())
    }
}
