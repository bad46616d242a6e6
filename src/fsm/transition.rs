//! Pure transition function and the per-review FSM wrapper.
//!
//! | From | Event | To | Extra outbox |
//! |------|-------|----|--------------|
//! | New | SubmitForReview | PendingReview | Spawn, Activity |
//! | PendingReview, ReReview | StartReview | UnderReview | |
//! | UnderReview, ChangesRequested, ReReview | Approve | Approved | Iteration, Activity |
//! | UnderReview, ChangesRequested, ReReview | RequestChanges | ChangesRequested | Iteration, Issues, Activity |
//! | UnderReview, ChangesRequested, ReReview | Reject | Rejected | Iteration, Activity |
//! | ChangesRequested | Resubmit | ReReview | SendMail |
//! | any non-terminal | Cancel | Cancelled | Activity |
//!
//! Every successful transition emits `PersistReviewState` then
//! `NotifyReviewStateChange` before the extras. Anything else is an
//! [`TransitionError::InvalidTransition`] and leaves the state untouched.

use super::event::ReviewEvent;
use super::outbox::{ActivityKind, OutboxEvent};
use super::state::ReviewState;
use chrono::{DateTime, Utc};
use gatekeeper_common::Decision;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Invalid transition: cannot apply '{event}' in state '{state}'")]
    InvalidTransition {
        state: ReviewState,
        event: &'static str,
    },
}

/// Immutable facts about a review, referenced by transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewEnv {
    pub review_id: String,
    pub thread_id: String,
    pub repo_path: String,
    pub requester_id: String,
}

/// Compute the next state and its outbox for `event` in `state`.
pub fn transition(
    state: ReviewState,
    env: &ReviewEnv,
    event: &ReviewEvent,
) -> Result<(ReviewState, Vec<OutboxEvent>), TransitionError> {
    use ReviewState::*;

    let invalid = || TransitionError::InvalidTransition {
        state,
        event: event.name(),
    };

    if state.is_terminal() {
        return Err(invalid());
    }

    let review_id = env.review_id.clone();
    let (next, extras) = match (state, event) {
        (New, ReviewEvent::SubmitForReview { requester_id }) => (
            PendingReview,
            vec![
                OutboxEvent::SpawnReviewerAgent {
                    review_id: review_id.clone(),
                    thread_id: env.thread_id.clone(),
                    repo_path: env.repo_path.clone(),
                },
                OutboxEvent::RecordActivity {
                    review_id,
                    kind: ActivityKind::Submitted,
                    description: format!("Review requested by {}", requester_id),
                },
            ],
        ),

        (PendingReview | ReReview, ReviewEvent::StartReview { .. }) => (UnderReview, vec![]),

        (UnderReview | ChangesRequested | ReReview, ReviewEvent::Approve { reviewer_id }) => (
            Approved,
            vec![
                iteration_marker(&review_id, reviewer_id, Decision::Approve),
                OutboxEvent::RecordActivity {
                    review_id,
                    kind: ActivityKind::Approved,
                    description: format!("Approved by {}", reviewer_id),
                },
            ],
        ),

        (
            UnderReview | ChangesRequested | ReReview,
            ReviewEvent::RequestChanges {
                reviewer_id,
                issues,
            },
        ) => (
            ChangesRequested,
            vec![
                iteration_marker(&review_id, reviewer_id, Decision::RequestChanges),
                OutboxEvent::CreateReviewIssues {
                    review_id: review_id.clone(),
                    reviewer_id: reviewer_id.clone(),
                    issues: issues.clone(),
                },
                OutboxEvent::RecordActivity {
                    review_id,
                    kind: ActivityKind::ChangesRequested,
                    description: format!(
                        "{} requested changes ({} issue{})",
                        reviewer_id,
                        issues.len(),
                        if issues.len() == 1 { "" } else { "s" }
                    ),
                },
            ],
        ),

        (UnderReview | ChangesRequested | ReReview, ReviewEvent::Reject { reviewer_id, reason }) => (
            Rejected,
            vec![
                iteration_marker(&review_id, reviewer_id, Decision::Reject),
                OutboxEvent::RecordActivity {
                    review_id,
                    kind: ActivityKind::Rejected,
                    description: format!("Rejected by {}: {}", reviewer_id, reason),
                },
            ],
        ),

        (ChangesRequested, ReviewEvent::Resubmit { new_commit_sha }) => (
            ReReview,
            vec![OutboxEvent::SendMailToReviewer {
                review_id,
                thread_id: env.thread_id.clone(),
                new_commit_sha: new_commit_sha.clone(),
            }],
        ),

        (_, ReviewEvent::Cancel { reason }) => (
            Cancelled,
            vec![OutboxEvent::RecordActivity {
                review_id,
                kind: ActivityKind::Cancelled,
                description: format!("Cancelled: {}", reason),
            }],
        ),

        _ => return Err(invalid()),
    };

    let mut outbox = Vec::with_capacity(extras.len() + 2);
    outbox.push(OutboxEvent::PersistReviewState {
        review_id: env.review_id.clone(),
        new_state: next,
    });
    outbox.push(OutboxEvent::NotifyReviewStateChange {
        review_id: env.review_id.clone(),
        old_state: state,
        new_state: next,
    });
    outbox.extend(extras);
    Ok((next, outbox))
}

fn iteration_marker(review_id: &str, reviewer_id: &str, decision: Decision) -> OutboxEvent {
    OutboxEvent::CreateReviewIteration {
        review_id: review_id.to_string(),
        reviewer_id: reviewer_id.to_string(),
        decision,
    }
}

/// One review's state machine.
#[derive(Debug, Clone)]
pub struct ReviewFsm {
    env: ReviewEnv,
    state: ReviewState,
    updated_at: DateTime<Utc>,
}

impl ReviewFsm {
    pub fn new(env: ReviewEnv) -> Self {
        Self::restore(env, ReviewState::New)
    }

    /// Rebuild an FSM from persisted state, e.g. after a restart.
    pub fn restore(env: ReviewEnv, state: ReviewState) -> Self {
        Self {
            env,
            state,
            updated_at: Utc::now(),
        }
    }

    pub fn env(&self) -> &ReviewEnv {
        &self.env
    }

    pub fn state(&self) -> ReviewState {
        self.state
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Apply `event`, returning the outbox on success. On error the state is
    /// unchanged.
    pub fn process(&mut self, event: &ReviewEvent) -> Result<Vec<OutboxEvent>, TransitionError> {
        let (next, outbox) = transition(self.state, &self.env, event)?;
        self.state = next;
        self.updated_at = Utc::now();
        Ok(outbox)
    }
}
