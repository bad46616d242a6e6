//! Typed error hierarchy for Gatekeeper.
//!
//! - `TransitionError` (re-exported from `fsm`): invalid event for a state
//! - `ReviewerError`: reviewer worker failures, reported through the worker's
//!   completion callback rather than returned to a caller
//! - `ServiceError`: administrative operations and event dispatch
//!
//! Store, config and CLI plumbing use `anyhow::Result` with context.

use thiserror::Error;

pub use crate::fsm::TransitionError;
use gatekeeper_common::ResultParseError;

/// Failures of a reviewer worker round.
#[derive(Debug, Error)]
pub enum ReviewerError {
    #[error("Failed to prepare reviewer sandbox: {0}")]
    Setup(String),

    #[error("Failed to start or talk to the agent process: {0}")]
    Connect(String),

    #[error("Agent is not authenticated: {0}")]
    Authentication(String),

    #[error("Agent session ended without producing a review result")]
    EmptyResult,

    #[error("Agent reported an error: {0}")]
    AgentError(String),

    #[error("No review-result block found in agent output")]
    NoResultBlock,

    #[error("Malformed review result: {0}")]
    MalformedResult(String),

    #[error("Invalid review decision: {0}")]
    InvalidDecision(String),

    #[error("Reviewer was cancelled")]
    Cancelled,
}

impl ReviewerError {
    /// Fatal errors cannot succeed on retry without intervention, so the
    /// review is cancelled instead of left for another attempt.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Authentication(_))
    }
}

impl From<ResultParseError> for ReviewerError {
    fn from(err: ResultParseError) -> Self {
        match err {
            ResultParseError::Malformed(msg) => Self::MalformedResult(msg),
            ResultParseError::MissingDecision => {
                Self::InvalidDecision("decision is missing".to_string())
            }
            ResultParseError::InvalidDecision(d) => Self::InvalidDecision(d),
        }
    }
}

/// Errors from the review service.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Review {id} not found")]
    ReviewNotFound { id: String },

    #[error("Issue {id} not found")]
    IssueNotFound { id: i64 },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("Database error: {0}")]
    Database(#[source] anyhow::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
