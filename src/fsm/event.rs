//! Events fed into the review FSM.

use gatekeeper_common::ResultIssue;
use serde::{Deserialize, Serialize};

/// Everything that can happen to a review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ReviewEvent {
    SubmitForReview {
        requester_id: String,
    },
    StartReview {
        reviewer_id: String,
    },
    RequestChanges {
        reviewer_id: String,
        issues: Vec<ResultIssue>,
    },
    Resubmit {
        new_commit_sha: Option<String>,
    },
    Approve {
        reviewer_id: String,
    },
    Reject {
        reviewer_id: String,
        reason: String,
    },
    Cancel {
        reason: String,
    },
}

impl ReviewEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SubmitForReview { .. } => "submit_for_review",
            Self::StartReview { .. } => "start_review",
            Self::RequestChanges { .. } => "request_changes",
            Self::Resubmit { .. } => "resubmit",
            Self::Approve { .. } => "approve",
            Self::Reject { .. } => "reject",
            Self::Cancel { .. } => "cancel",
        }
    }
}
