//! The structured result a reviewer agent reports.
//!
//! Agents embed the result in free text; locating the fenced block is the
//! caller's job. This module parses the block *content*: JSON first, YAML as a
//! fallback. `decision` is mandatory and must be one of `approve`,
//! `request_changes` or `reject`. Every other field is optional, and issue
//! types and severities are normalized rather than validated.
//!
//! ```
//! use gatekeeper_common::{Decision, ReviewerResult};
//!
//! let result = ReviewerResult::parse(r#"{"decision": "approve", "summary": "LGTM"}"#).unwrap();
//! assert_eq!(result.decision, Decision::Approve);
//! assert!(result.issues.is_empty());
//!
//! assert!(ReviewerResult::parse(r#"{"summary": "no decision"}"#).is_err());
//! ```

use crate::issue::{IssueType, Severity};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A reviewer's verdict for one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    RequestChanges,
    Reject,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::RequestChanges => "request_changes",
            Self::Reject => "reject",
        }
    }

    /// Approve and reject end the review; request_changes keeps it open.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approve | Self::Reject)
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Decision {
    type Err = ResultParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approve" => Ok(Self::Approve),
            "request_changes" => Ok(Self::RequestChanges),
            "reject" => Ok(Self::Reject),
            other => Err(ResultParseError::InvalidDecision(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResultParseError {
    #[error("Result block is neither valid JSON nor YAML: {0}")]
    Malformed(String),

    #[error("Result block has no decision")]
    MissingDecision,

    #[error("Invalid decision '{0}': expected approve, request_changes or reject")]
    InvalidDecision(String),
}

/// One issue reported by a reviewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultIssue {
    pub title: String,
    pub issue_type: IssueType,
    pub severity: Severity,
    pub file: String,
    pub line_start: u32,
    pub line_end: Option<u32>,
    pub description: String,
    pub snippet: String,
    pub suggestion: String,
    /// Quoted project-rule text the issue is based on.
    pub rule_citation: Option<String>,
}

/// Parsed reviewer output for one round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewerResult {
    pub decision: Decision,
    pub summary: String,
    pub issues: Vec<ResultIssue>,
    pub files_reviewed: u32,
    pub lines_analyzed: u32,
}

#[derive(Debug, Deserialize)]
struct RawResult {
    #[serde(default)]
    decision: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    issues: Option<Vec<RawIssue>>,
    #[serde(default, alias = "filesReviewed", deserialize_with = "lenient_count")]
    files_reviewed: Option<u32>,
    #[serde(default, alias = "linesAnalyzed", deserialize_with = "lenient_count")]
    lines_analyzed: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RawIssue {
    #[serde(default)]
    title: Option<String>,
    #[serde(default, rename = "type", alias = "issue_type", alias = "issueType")]
    issue_type: Option<String>,
    #[serde(default)]
    severity: Option<String>,
    #[serde(default, alias = "file_path", alias = "filePath", alias = "path")]
    file: Option<String>,
    #[serde(
        default,
        alias = "lineStart",
        alias = "line",
        deserialize_with = "lenient_count"
    )]
    line_start: Option<u32>,
    #[serde(default, alias = "lineEnd", deserialize_with = "lenient_count")]
    line_end: Option<u32>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default, alias = "code_snippet", alias = "codeSnippet")]
    snippet: Option<String>,
    #[serde(default)]
    suggestion: Option<String>,
    #[serde(default, alias = "ruleCitation")]
    rule_citation: Option<String>,
}

/// Line numbers and counts as agents actually write them: integers, numeric
/// strings and whole floats. Anything else, negatives included, reads as
/// absent instead of failing the whole result.
fn lenient_count<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(count_from_value))
}

fn count_from_value(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => match n.as_u64() {
            Some(n) => u32::try_from(n).ok(),
            None => n.as_f64().and_then(count_from_float),
        },
        Value::String(s) => {
            let s = s.trim();
            s.parse::<u32>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(count_from_float))
        }
        _ => None,
    }
}

fn count_from_float(f: f64) -> Option<u32> {
    (f.fract() == 0.0 && (0.0..=u32::MAX as f64).contains(&f)).then_some(f as u32)
}

impl From<RawIssue> for ResultIssue {
    fn from(raw: RawIssue) -> Self {
        Self {
            title: raw.title.unwrap_or_default(),
            issue_type: raw
                .issue_type
                .as_deref()
                .map(IssueType::normalize)
                .unwrap_or(IssueType::Other),
            severity: raw
                .severity
                .as_deref()
                .map(Severity::normalize)
                .unwrap_or_default(),
            file: raw.file.unwrap_or_default(),
            line_start: raw.line_start.unwrap_or(0),
            line_end: raw.line_end,
            description: raw.description.unwrap_or_default(),
            snippet: raw.snippet.unwrap_or_default(),
            suggestion: raw.suggestion.unwrap_or_default(),
            rule_citation: raw.rule_citation.filter(|c| !c.trim().is_empty()),
        }
    }
}

impl ReviewerResult {
    /// Parse the content of a result block.
    pub fn parse(content: &str) -> Result<Self, ResultParseError> {
        let raw: RawResult = match serde_json::from_str(content) {
            Ok(raw) => raw,
            Err(json_err) => serde_yaml::from_str(content)
                .map_err(|_| ResultParseError::Malformed(json_err.to_string()))?,
        };

        let decision = raw
            .decision
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .ok_or(ResultParseError::MissingDecision)?
            .parse::<Decision>()?;

        Ok(Self {
            decision,
            summary: raw.summary.unwrap_or_default(),
            issues: raw
                .issues
                .unwrap_or_default()
                .into_iter()
                .map(ResultIssue::from)
                .collect(),
            files_reviewed: raw.files_reviewed.unwrap_or(0),
            lines_analyzed: raw.lines_analyzed.unwrap_or(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_json_result() {
        let content = r#"{
            "decision": "request_changes",
            "summary": "Two problems",
            "issues": [
                {
                    "title": "Unchecked index",
                    "type": "logic",
                    "severity": "high",
                    "file": "src/lib.rs",
                    "line_start": 10,
                    "line_end": 12,
                    "description": "Panics on empty input",
                    "snippet": "v[0]",
                    "suggestion": "Use v.first()",
                    "rule_citation": "Never index without a bounds check"
                },
                {"title": "Typo", "type": "docs", "severity": "bogus"}
            ],
            "files_reviewed": 3,
            "lines_analyzed": 120
        }"#;

        let result = ReviewerResult::parse(content).unwrap();
        assert_eq!(result.decision, Decision::RequestChanges);
        assert_eq!(result.issues.len(), 2);
        assert_eq!(result.issues[0].issue_type, IssueType::LogicError);
        assert_eq!(result.issues[0].severity, Severity::High);
        assert_eq!(result.issues[0].line_end, Some(12));
        assert_eq!(
            result.issues[0].rule_citation.as_deref(),
            Some("Never index without a bounds check")
        );
        assert_eq!(result.issues[1].issue_type, IssueType::Documentation);
        assert_eq!(result.issues[1].severity, Severity::Medium);
        assert_eq!(result.issues[1].line_start, 0);
        assert_eq!(result.files_reviewed, 3);
        assert_eq!(result.lines_analyzed, 120);
    }

    #[test]
    fn test_parse_yaml_fallback() {
        let content = "decision: reject\nsummary: Wrong approach\nissues:\n  - title: Broken\n    type: architecture\n    severity: critical\n";
        let result = ReviewerResult::parse(content).unwrap();
        assert_eq!(result.decision, Decision::Reject);
        assert_eq!(result.issues[0].issue_type, IssueType::Architecture);
        assert_eq!(result.issues[0].severity, Severity::Critical);
    }

    #[test]
    fn test_camel_case_aliases() {
        let content = r#"{"decision":"approve","filesReviewed":2,"issues":[{"title":"x","filePath":"a.rs","lineStart":4}]}"#;
        let result = ReviewerResult::parse(content).unwrap();
        assert_eq!(result.files_reviewed, 2);
        assert_eq!(result.issues[0].file, "a.rs");
        assert_eq!(result.issues[0].line_start, 4);
    }

    #[test]
    fn test_numeric_fields_accept_strings_and_whole_floats() {
        let content = r#"{
            "decision": "approve",
            "files_reviewed": 3.0,
            "lines_analyzed": " 120 ",
            "issues": [{"line_start": "12", "line_end": 14.0}]
        }"#;
        let result = ReviewerResult::parse(content).unwrap();
        assert_eq!(result.decision, Decision::Approve);
        assert_eq!(result.files_reviewed, 3);
        assert_eq!(result.lines_analyzed, 120);
        assert_eq!(result.issues[0].line_start, 12);
        assert_eq!(result.issues[0].line_end, Some(14));
    }

    #[test]
    fn test_unusable_numeric_fields_fall_back_to_defaults() {
        let content = r#"{
            "decision": "request_changes",
            "files_reviewed": -1,
            "lines_analyzed": "lots",
            "issues": [
                {"line_start": -1, "line_end": 2.5},
                {"line_start": [1, 2], "line_end": null},
                {"line_start": 99999999999}
            ]
        }"#;
        let result = ReviewerResult::parse(content).unwrap();
        assert_eq!(result.decision, Decision::RequestChanges);
        assert_eq!(result.files_reviewed, 0);
        assert_eq!(result.lines_analyzed, 0);
        assert_eq!(result.issues.len(), 3);
        assert_eq!(result.issues[0].line_start, 0);
        assert_eq!(result.issues[0].line_end, None);
        assert_eq!(result.issues[1].line_start, 0);
        assert_eq!(result.issues[2].line_start, 0);
    }

    #[test]
    fn test_yaml_numeric_strings() {
        let content = "decision: approve\nfiles_reviewed: \"4\"\nissues:\n  - line_start: \"7\"\n";
        let result = ReviewerResult::parse(content).unwrap();
        assert_eq!(result.files_reviewed, 4);
        assert_eq!(result.issues[0].line_start, 7);
    }

    #[test]
    fn test_missing_decision_fails() {
        let err = ReviewerResult::parse(r#"{"summary":"hi"}"#).unwrap_err();
        assert_eq!(err, ResultParseError::MissingDecision);
    }

    #[test]
    fn test_invalid_decision_fails() {
        let err = ReviewerResult::parse(r#"{"decision":"lgtm"}"#).unwrap_err();
        assert_eq!(err, ResultParseError::InvalidDecision("lgtm".into()));
    }

    #[test]
    fn test_malformed_content_fails() {
        let err = ReviewerResult::parse("{ not json: [").unwrap_err();
        assert!(matches!(err, ResultParseError::Malformed(_)));
    }

    #[test]
    fn test_decision_terminality() {
        assert!(Decision::Approve.is_terminal());
        assert!(Decision::Reject.is_terminal());
        assert!(!Decision::RequestChanges.is_terminal());
    }
}
