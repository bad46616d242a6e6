//! Outbox events: the side effects of a transition, returned as data.
//!
//! The FSM never touches the store, the notifier or the supervisor. Each
//! successful transition returns an ordered `Vec<OutboxEvent>` and the
//! dispatcher in `service` interprets them in that order. Every transition
//! starts with `PersistReviewState` followed by `NotifyReviewStateChange`.

use super::state::ReviewState;
use gatekeeper_common::{Decision, ResultIssue};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboxEvent {
    PersistReviewState {
        review_id: String,
        new_state: ReviewState,
    },
    NotifyReviewStateChange {
        review_id: String,
        old_state: ReviewState,
        new_state: ReviewState,
    },
    SpawnReviewerAgent {
        review_id: String,
        thread_id: String,
        repo_path: String,
    },
    SendMailToReviewer {
        review_id: String,
        thread_id: String,
        new_commit_sha: Option<String>,
    },
    CreateReviewIteration {
        review_id: String,
        reviewer_id: String,
        decision: Decision,
    },
    CreateReviewIssues {
        review_id: String,
        reviewer_id: String,
        issues: Vec<ResultIssue>,
    },
    RecordActivity {
        review_id: String,
        kind: ActivityKind,
        description: String,
    },
}

impl OutboxEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::PersistReviewState { .. } => "persist_review_state",
            Self::NotifyReviewStateChange { .. } => "notify_review_state_change",
            Self::SpawnReviewerAgent { .. } => "spawn_reviewer_agent",
            Self::SendMailToReviewer { .. } => "send_mail_to_reviewer",
            Self::CreateReviewIteration { .. } => "create_review_iteration",
            Self::CreateReviewIssues { .. } => "create_review_issues",
            Self::RecordActivity { .. } => "record_activity",
        }
    }
}

/// Kind of an activity log row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Submitted,
    Approved,
    ChangesRequested,
    Rejected,
    Cancelled,
    ReviewerFailed,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::Approved => "approved",
            Self::ChangesRequested => "changes_requested",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
            Self::ReviewerFailed => "reviewer_failed",
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "submitted" => Ok(Self::Submitted),
            "approved" => Ok(Self::Approved),
            "changes_requested" => Ok(Self::ChangesRequested),
            "rejected" => Ok(Self::Rejected),
            "cancelled" => Ok(Self::Cancelled),
            "reviewer_failed" => Ok(Self::ReviewerFailed),
            _ => Err(format!("Invalid activity kind: {}", s)),
        }
    }
}
