//! Per-round result capture.
//!
//! The worker feeds every assistant text and every final turn envelope into a
//! [`ResultCapture`]. A result is captured at most once per round: eagerly,
//! as soon as a parseable block shows up in assistant text, or otherwise from
//! the turn's final envelope. [`ResultCapture::begin_round`] re-arms it when a
//! follow-up prompt starts a new round on the same session.

use regex::Regex;
use std::sync::LazyLock;

use gatekeeper_common::ReviewerResult;

use super::result::{extract_result_block, has_result_block};
use crate::errors::ReviewerError;

// Messages the CLI prints in place of a reply when it has no usable
// credentials.
static AUTH_FAILURE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(invalid api key|please run /login|not logged in|oauth token (?:has )?expired|authentication_error|api error: 401|credentials? (?:are|is) (?:missing|invalid))",
    )
    .unwrap()
});

// Auth failures arrive as a short standalone message. Longer texts are review
// prose that may legitimately discuss authentication.
const AUTH_MESSAGE_MAX_LEN: usize = 500;

/// Returns the offending text when `text` looks like a CLI authentication
/// failure rather than a review.
///
/// Auth detection takes priority only over texts that could be a bare CLI
/// error: long texts and texts carrying a result block are treated as review
/// prose, so a review that quotes "invalid api key" is never cancelled.
pub fn detect_auth_failure(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.len() > AUTH_MESSAGE_MAX_LEN || has_result_block(trimmed) {
        return None;
    }
    AUTH_FAILURE_REGEX
        .is_match(trimmed)
        .then(|| trimmed.to_string())
}

/// What a single assistant text produced.
#[derive(Debug)]
pub enum Observation {
    Nothing,
    AuthFailure(String),
    Captured(ReviewerResult),
}

/// What the end of a turn produced.
#[derive(Debug)]
pub enum TurnOutcome {
    /// The round's result was already captured from assistant text.
    AlreadyCaptured,
    Captured(ReviewerResult),
    Failed(ReviewerError),
}

#[derive(Debug, Default)]
pub struct ResultCapture {
    captured: bool,
    last_text: Option<String>,
    // Parse failure from an eager attempt, reported only if nothing better
    // turns up before the turn ends.
    deferred_error: Option<ReviewerError>,
    auth_failure: Option<String>,
}

impl ResultCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_captured(&self) -> bool {
        self.captured
    }

    /// Re-arm for the next round on the same session.
    pub fn begin_round(&mut self) {
        self.captured = false;
        self.last_text = None;
        self.deferred_error = None;
        self.auth_failure = None;
    }

    pub fn observe_text(&mut self, text: &str) -> Observation {
        if let Some(message) = detect_auth_failure(text) {
            self.auth_failure = Some(message.clone());
            return Observation::AuthFailure(message);
        }
        if text.trim().is_empty() {
            return Observation::Nothing;
        }
        self.last_text = Some(text.to_string());

        if self.captured {
            return Observation::Nothing;
        }
        let Some(content) = extract_result_block(text) else {
            return Observation::Nothing;
        };
        match ReviewerResult::parse(content) {
            Ok(result) => {
                self.captured = true;
                self.deferred_error = None;
                Observation::Captured(result)
            }
            Err(e) => {
                self.deferred_error = Some(e.into());
                Observation::Nothing
            }
        }
    }

    /// Settle the round when the final envelope arrives. `result_text` is the
    /// envelope's text, if it carried any.
    pub fn finish_turn(&mut self, result_text: Option<&str>, is_error: bool) -> TurnOutcome {
        if let Some(message) = self.auth_failure.take() {
            return TurnOutcome::Failed(ReviewerError::Authentication(message));
        }
        if self.captured {
            return TurnOutcome::AlreadyCaptured;
        }

        let envelope_text = result_text.map(str::trim).filter(|t| !t.is_empty());
        if let Some(text) = envelope_text
            && let Some(message) = detect_auth_failure(text)
        {
            return TurnOutcome::Failed(ReviewerError::Authentication(message));
        }
        if is_error {
            let detail = envelope_text.unwrap_or("turn ended with an error").to_string();
            return TurnOutcome::Failed(ReviewerError::AgentError(detail));
        }

        let candidate = match envelope_text {
            Some(text) => text.to_string(),
            None => match self.last_text.take() {
                Some(text) => text,
                None => return TurnOutcome::Failed(ReviewerError::EmptyResult),
            },
        };

        let Some(content) = extract_result_block(&candidate) else {
            return TurnOutcome::Failed(
                self.deferred_error.take().unwrap_or(ReviewerError::NoResultBlock),
            );
        };
        match ReviewerResult::parse(content) {
            Ok(result) => {
                self.captured = true;
                TurnOutcome::Captured(result)
            }
            Err(e) => TurnOutcome::Failed(e.into()),
        }
    }

    /// Called when the message stream closes. Returns the error to report,
    /// or `None` if this round already produced a result.
    pub fn end_of_stream(&mut self) -> Option<ReviewerError> {
        if let Some(message) = self.auth_failure.take() {
            return Some(ReviewerError::Authentication(message));
        }
        if self.captured {
            return None;
        }
        Some(ReviewerError::EmptyResult)
    }
}
