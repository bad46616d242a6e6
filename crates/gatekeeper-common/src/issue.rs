//! Issue classification types.
//!
//! Reviewer agents produce free-form issue types and severities. Rather than
//! rejecting values outside the closed vocabulary, both are normalized through
//! an alias table and fall back to a catch-all, so a sloppy agent never causes
//! a whole review round to be discarded.
//!
//! ```
//! use gatekeeper_common::{IssueType, Severity};
//!
//! assert_eq!(IssueType::normalize("logic"), IssueType::LogicError);
//! assert_eq!(IssueType::normalize("docs"), IssueType::Documentation);
//! assert_eq!(IssueType::normalize("cosmic-rays"), IssueType::Other);
//! assert_eq!(Severity::normalize("blocker"), Severity::Critical);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed set of issue categories stored with each review issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    Bug,
    Security,
    Performance,
    LogicError,
    ErrorHandling,
    Style,
    Documentation,
    TestCoverage,
    Architecture,
    Maintainability,
    Other,
}

impl IssueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bug => "bug",
            Self::Security => "security",
            Self::Performance => "performance",
            Self::LogicError => "logic_error",
            Self::ErrorHandling => "error_handling",
            Self::Style => "style",
            Self::Documentation => "documentation",
            Self::TestCoverage => "test_coverage",
            Self::Architecture => "architecture",
            Self::Maintainability => "maintainability",
            Self::Other => "other",
        }
    }

    /// Map an agent-supplied type onto the closed vocabulary.
    ///
    /// Canonical names and known aliases are matched case-insensitively, with
    /// `-` and spaces treated as `_`. Anything else becomes [`IssueType::Other`].
    pub fn normalize(raw: &str) -> Self {
        let key = raw.trim().to_lowercase().replace(['-', ' '], "_");
        if let Ok(canonical) = key.parse::<IssueType>() {
            return canonical;
        }
        match key.as_str() {
            "logic" | "logical" | "correctness" => Self::LogicError,
            "docs" | "doc" | "comment" | "comments" => Self::Documentation,
            "test" | "tests" | "testing" | "coverage" => Self::TestCoverage,
            "perf" | "efficiency" => Self::Performance,
            "sec" | "vulnerability" | "vuln" => Self::Security,
            "design" | "structure" => Self::Architecture,
            "readability" | "complexity" | "refactor" => Self::Maintainability,
            "errors" | "error" | "panic" => Self::ErrorHandling,
            "formatting" | "naming" | "lint" => Self::Style,
            "defect" | "crash" => Self::Bug,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IssueType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bug" => Ok(Self::Bug),
            "security" => Ok(Self::Security),
            "performance" => Ok(Self::Performance),
            "logic_error" => Ok(Self::LogicError),
            "error_handling" => Ok(Self::ErrorHandling),
            "style" => Ok(Self::Style),
            "documentation" => Ok(Self::Documentation),
            "test_coverage" => Ok(Self::TestCoverage),
            "architecture" => Ok(Self::Architecture),
            "maintainability" => Ok(Self::Maintainability),
            "other" => Ok(Self::Other),
            _ => Err(format!("Invalid issue type: {}", s)),
        }
    }
}

/// Issue severity, most severe first.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    #[default]
    Medium,
    Low,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Info => "info",
        }
    }

    /// Map an agent-supplied severity onto the closed vocabulary, defaulting
    /// to [`Severity::Medium`].
    pub fn normalize(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "critical" | "blocker" | "fatal" => Self::Critical,
            "high" | "major" | "error" => Self::High,
            "medium" | "moderate" | "warning" | "warn" => Self::Medium,
            "low" | "minor" => Self::Low,
            "info" | "note" | "nit" | "trivial" => Self::Info,
            _ => Self::Medium,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "critical" => Ok(Self::Critical),
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            "info" => Ok(Self::Info),
            _ => Err(format!("Invalid severity: {}", s)),
        }
    }
}

/// Lifecycle of a persisted review issue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueStatus {
    #[default]
    Open,
    Resolved,
}

impl IssueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Resolved => "resolved",
        }
    }
}

impl fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IssueStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "resolved" => Ok(Self::Resolved),
            _ => Err(format!("Invalid issue status: {}", s)),
        }
    }
}
