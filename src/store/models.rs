use std::str::FromStr;

use anyhow::Result;
use gatekeeper_common::{Decision, IssueStatus, IssueType, Severity};
use serde::{Deserialize, Serialize};

use crate::fsm::{ActivityKind, ReviewState};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            _ => Err(format!("Invalid priority: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: String,
    pub thread_id: String,
    pub requester_id: String,
    pub branch: Option<String>,
    pub base_branch: Option<String>,
    pub commit_sha: Option<String>,
    pub repo_path: String,
    pub review_type: String,
    pub priority: Priority,
    pub state: ReviewState,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

/// Fields supplied when a review is requested.
#[derive(Debug, Clone, Default)]
pub struct NewReview {
    /// Defaults to the review id.
    pub thread_id: Option<String>,
    pub requester_id: String,
    pub branch: Option<String>,
    pub base_branch: Option<String>,
    pub commit_sha: Option<String>,
    pub repo_path: String,
    pub review_type: String,
    pub priority: Priority,
}

#[derive(Debug, Clone, Default)]
pub struct ReviewFilter {
    pub state: Option<ReviewState>,
    pub requester_id: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewIteration {
    pub id: i64,
    pub review_id: String,
    pub iteration_num: i64,
    pub reviewer_id: String,
    pub session_id: Option<String>,
    pub decision: Decision,
    pub summary: String,
    pub files_reviewed: i64,
    pub lines_analyzed: i64,
    pub duration_ms: i64,
    pub cost_usd: f64,
    pub started_at: String,
    pub completed_at: String,
}

/// A completed round, as captured by the worker. The iteration number is
/// assigned by the store.
#[derive(Debug, Clone)]
pub struct NewIteration {
    pub reviewer_id: String,
    pub session_id: Option<String>,
    pub decision: Decision,
    pub summary: String,
    pub files_reviewed: u32,
    pub lines_analyzed: u32,
    pub duration_ms: u64,
    pub cost_usd: f64,
    pub started_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewIssue {
    pub id: i64,
    pub review_id: String,
    pub iteration_num: i64,
    pub issue_type: IssueType,
    pub severity: Severity,
    pub file_path: String,
    pub line_start: i64,
    pub line_end: Option<i64>,
    pub title: String,
    pub description: String,
    pub code_snippet: String,
    pub suggestion: String,
    pub rule_citation: Option<String>,
    pub status: IssueStatus,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    pub id: i64,
    pub review_id: String,
    pub kind: ActivityKind,
    pub description: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: i64,
    pub name: String,
    pub last_seen_at: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub sender: String,
    pub thread_id: Option<String>,
    pub subject: String,
    pub body: String,
    pub created_at: String,
}

// ── Row types ─────────────────────────────────────────────────────────
//
// Raw rows as read from SQLite; enum columns are parsed in `into_*`.

pub(crate) struct ReviewRow {
    pub id: String,
    pub thread_id: String,
    pub requester_id: String,
    pub branch: Option<String>,
    pub base_branch: Option<String>,
    pub commit_sha: Option<String>,
    pub repo_path: String,
    pub review_type: String,
    pub priority: String,
    pub state: String,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

impl ReviewRow {
    pub fn into_review(self) -> Result<Review> {
        let priority = Priority::from_str(&self.priority).map_err(|e| anyhow::anyhow!(e))?;
        Ok(Review {
            id: self.id,
            thread_id: self.thread_id,
            requester_id: self.requester_id,
            branch: self.branch,
            base_branch: self.base_branch,
            commit_sha: self.commit_sha,
            repo_path: self.repo_path,
            review_type: self.review_type,
            priority,
            state: ReviewState::from_persisted(&self.state),
            created_at: self.created_at,
            updated_at: self.updated_at,
            completed_at: self.completed_at,
        })
    }
}

pub(crate) struct IterationRow {
    pub id: i64,
    pub review_id: String,
    pub iteration_num: i64,
    pub reviewer_id: String,
    pub session_id: Option<String>,
    pub decision: String,
    pub summary: String,
    pub files_reviewed: i64,
    pub lines_analyzed: i64,
    pub duration_ms: i64,
    pub cost_usd: f64,
    pub started_at: String,
    pub completed_at: String,
}

impl IterationRow {
    pub fn into_iteration(self) -> Result<ReviewIteration> {
        let decision = Decision::from_str(&self.decision)?;
        Ok(ReviewIteration {
            id: self.id,
            review_id: self.review_id,
            iteration_num: self.iteration_num,
            reviewer_id: self.reviewer_id,
            session_id: self.session_id,
            decision,
            summary: self.summary,
            files_reviewed: self.files_reviewed,
            lines_analyzed: self.lines_analyzed,
            duration_ms: self.duration_ms,
            cost_usd: self.cost_usd,
            started_at: self.started_at,
            completed_at: self.completed_at,
        })
    }
}

pub(crate) struct IssueRow {
    pub id: i64,
    pub review_id: String,
    pub iteration_num: i64,
    pub issue_type: String,
    pub severity: String,
    pub file_path: String,
    pub line_start: i64,
    pub line_end: Option<i64>,
    pub title: String,
    pub description: String,
    pub code_snippet: String,
    pub suggestion: String,
    pub rule_citation: Option<String>,
    pub status: String,
    pub created_at: String,
}

impl IssueRow {
    pub fn into_issue(self) -> Result<ReviewIssue> {
        let status = IssueStatus::from_str(&self.status).map_err(|e| anyhow::anyhow!(e))?;
        Ok(ReviewIssue {
            id: self.id,
            review_id: self.review_id,
            iteration_num: self.iteration_num,
            issue_type: IssueType::normalize(&self.issue_type),
            severity: Severity::normalize(&self.severity),
            file_path: self.file_path,
            line_start: self.line_start,
            line_end: self.line_end,
            title: self.title,
            description: self.description,
            code_snippet: self.code_snippet,
            suggestion: self.suggestion,
            rule_citation: self.rule_citation,
            status,
            created_at: self.created_at,
        })
    }
}

pub(crate) struct ActivityRow {
    pub id: i64,
    pub review_id: String,
    pub kind: String,
    pub description: String,
    pub created_at: String,
}

impl ActivityRow {
    pub fn into_activity(self) -> Result<Activity> {
        let kind = ActivityKind::from_str(&self.kind).map_err(|e| anyhow::anyhow!(e))?;
        Ok(Activity {
            id: self.id,
            review_id: self.review_id,
            kind,
            description: self.description,
            created_at: self.created_at,
        })
    }
}
