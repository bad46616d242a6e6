//! Review lifecycle states.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The eight states a review moves through.
///
/// `Approved`, `Rejected` and `Cancelled` are terminal: no event is accepted
/// once a review reaches one of them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewState {
    #[default]
    New,
    PendingReview,
    UnderReview,
    ChangesRequested,
    ReReview,
    Approved,
    Rejected,
    Cancelled,
}

impl ReviewState {
    pub const ALL: [ReviewState; 8] = [
        Self::New,
        Self::PendingReview,
        Self::UnderReview,
        Self::ChangesRequested,
        Self::ReReview,
        Self::Approved,
        Self::Rejected,
        Self::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::PendingReview => "pending_review",
            Self::UnderReview => "under_review",
            Self::ChangesRequested => "changes_requested",
            Self::ReReview => "re_review",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected | Self::Cancelled)
    }

    /// Decode a persisted state string, falling back to [`ReviewState::New`]
    /// for anything unrecognised so rows written by other versions still load.
    pub fn from_persisted(s: &str) -> Self {
        s.parse().unwrap_or(Self::New)
    }
}

impl fmt::Display for ReviewState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReviewState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(Self::New),
            "pending_review" => Ok(Self::PendingReview),
            "under_review" => Ok(Self::UnderReview),
            "changes_requested" => Ok(Self::ChangesRequested),
            "re_review" => Ok(Self::ReReview),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid review state: {}", s)),
        }
    }
}
