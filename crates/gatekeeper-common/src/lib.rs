//! Shared review domain types for Gatekeeper.
//!
//! These types have no I/O and are shared between the orchestrator crate and
//! anything that needs to read or produce reviewer output:
//!
//! - [`issue`]: issue classification (`IssueType`, `Severity`, `IssueStatus`)
//! - [`result`]: the structured result a reviewer agent reports (`ReviewerResult`)
//! - [`persona`]: reviewer personas and static reviewer configuration

pub mod issue;
pub mod persona;
pub mod result;

pub use issue::{IssueStatus, IssueType, Severity};
pub use persona::{DEFAULT_REVIEWER_MODEL, Persona, ReviewerConfig};
pub use result::{Decision, ResultIssue, ResultParseError, ReviewerResult};
