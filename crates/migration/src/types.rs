//! Shared value types for the migration domain.
//!
//! These are the shapes the orchestrator works with once an infrastructure
//! adapter has translated the platform's wire format. None of them know how
//! they were fetched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{IssueNumber, OrganizationName, RepositoryName};

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly; the underlying representation can change without affecting the
/// domain API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Parses an RFC 3339 string (the platform's timestamp format).
    ///
    /// Returns `None` if the string is not a valid RFC 3339 timestamp.
    pub fn parse_rfc3339(value: &str) -> Option<Self> {
        DateTime::parse_from_rfc3339(value)
            .ok()
            .map(|dt| Self(dt.with_timezone(&Utc)))
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
    }
}

// ---------------------------------------------------------------------------
// Repository addressing
// ---------------------------------------------------------------------------

/// A fully-qualified repository: owner organization plus repository name.
///
/// Displays as `"owner/name"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepositoryPath {
    pub owner: OrganizationName,
    pub name: RepositoryName,
}

impl RepositoryPath {
    pub fn new(owner: OrganizationName, name: RepositoryName) -> Self {
        Self { owner, name }
    }
}

impl std::fmt::Display for RepositoryPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

// ---------------------------------------------------------------------------
// Remote descriptors
// ---------------------------------------------------------------------------

/// A repository as listed on the source organization.
#[derive(Debug, Clone, PartialEq)]
pub struct RepositoryDescriptor {
    pub name: RepositoryName,
    pub private: bool,
    pub description: Option<String>,
}

/// Open/closed state of an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueState {
    Open,
    Closed,
}

/// One comment on a source issue.
#[derive(Debug, Clone, PartialEq)]
pub struct CommentDescriptor {
    /// Comment text. `None` or empty when the author left no text.
    pub body: Option<String>,
    /// Login of the author; `None` for deleted accounts.
    pub author: Option<String>,
    pub created_at: Option<Timestamp>,
}

/// The comment payload attached to an issue listing.
///
/// Depending on which endpoint produced the issue, the platform returns
/// either a bare count or the materialized comment list. The orchestrator
/// resolves this to a concrete ordered list before replaying anything.
#[derive(Debug, Clone, PartialEq)]
pub enum IssueComments {
    /// Only the number of comments is known; the list must be fetched.
    Count(u64),
    /// The ordered comments, oldest first.
    List(Vec<CommentDescriptor>),
}

/// An issue as listed on the source repository.
#[derive(Debug, Clone, PartialEq)]
pub struct IssueDescriptor {
    pub number: IssueNumber,
    pub title: String,
    pub body: Option<String>,
    pub state: IssueState,
    pub author: Option<String>,
    pub created_at: Option<Timestamp>,
    pub comments: IssueComments,
}

/// The platform's answer to an issue creation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreatedIssue {
    /// Number the target repository assigned to the new issue.
    pub number: IssueNumber,
}

// ---------------------------------------------------------------------------
// Content transfer outcome
// ---------------------------------------------------------------------------

/// Why a content transfer did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferFailure {
    /// The version-control tool could not be started.
    ToolUnavailable,
    /// Cloning the source failed.
    CloneFailed,
    /// Fetching or pushing large-file objects failed.
    LfsFailed,
    /// Pushing refs to the target failed for a reason other than scope.
    PushFailed,
    /// The token lacks a scope or permission required by the target
    /// (e.g. pushing workflow files without the `workflow` scope).
    MissingScope,
    /// A step exceeded its time limit.
    TimedOut,
}

impl std::fmt::Display for TransferFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TransferFailure::ToolUnavailable => "tool unavailable",
            TransferFailure::CloneFailed => "clone failed",
            TransferFailure::LfsFailed => "large-file transfer failed",
            TransferFailure::PushFailed => "push failed",
            TransferFailure::MissingScope => "missing token scope or permission",
            TransferFailure::TimedOut => "timed out",
        };
        f.write_str(s)
    }
}

/// Result of a content transfer. Transfers never raise; failures are data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    Succeeded,
    Failed {
        reason: TransferFailure,
        /// Diagnostic text from the tool, with credentials redacted.
        diagnostics: String,
    },
}

impl TransferOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TransferOutcome::Succeeded)
    }
}
