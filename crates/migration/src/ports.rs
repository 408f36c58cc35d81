//! Port traits: what the orchestrator needs from the outside world.
//!
//! Infrastructure crates implement these; the orchestrator only ever sees the
//! traits, which keeps the reconciliation logic testable with in-memory fakes.
//!
//! | Trait | Implemented by |
//! |-------|----------------|
//! | [`RemoteClient`] | `github::GitHubClient` |
//! | [`ContentTransfer`] | `transfer::GitMirrorTransfer` |
//! | [`ProgressStore`] | `checkpoint::JsonCheckpointStore` |

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::{
    CheckpointDocument, CheckpointError, CommentDescriptor, CreatedIssue, IssueDescriptor,
    IssueNumber, OrganizationName, RemoteError, RepositoryDescriptor, RepositoryName,
    RepositoryPath, TransferOutcome,
};

// ---------------------------------------------------------------------------
// Remote platform API
// ---------------------------------------------------------------------------

/// Authenticated access to the hosting platform's API.
///
/// Every call either succeeds or fails with a [`RemoteError`] carrying the
/// HTTP status. Bounding call latency and retrying transient failures are the
/// implementation's responsibility.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Lists every repository owned by `org`.
    async fn list_repositories(
        &self,
        org: &OrganizationName,
    ) -> Result<Vec<RepositoryDescriptor>, RemoteError>;

    /// Creates an empty repository.
    ///
    /// Fails with status 422 if a repository with that name already exists.
    async fn create_repository(
        &self,
        org: &OrganizationName,
        name: &RepositoryName,
        private: bool,
        description: &str,
    ) -> Result<RepositoryDescriptor, RemoteError>;

    /// Lists every issue (open and closed, pull requests excluded), sorted
    /// ascending by number.
    async fn list_issues(&self, repo: &RepositoryPath) -> Result<Vec<IssueDescriptor>, RemoteError>;

    /// Creates an issue; the platform assigns the next number in sequence.
    async fn create_issue(
        &self,
        repo: &RepositoryPath,
        title: &str,
        body: &str,
    ) -> Result<CreatedIssue, RemoteError>;

    async fn close_issue(&self, repo: &RepositoryPath, number: IssueNumber) -> Result<(), RemoteError>;

    /// Lists the comments on one issue, oldest first.
    async fn list_issue_comments(
        &self,
        repo: &RepositoryPath,
        number: IssueNumber,
    ) -> Result<Vec<CommentDescriptor>, RemoteError>;

    async fn create_issue_comment(
        &self,
        repo: &RepositoryPath,
        number: IssueNumber,
        body: &str,
    ) -> Result<(), RemoteError>;
}

// ---------------------------------------------------------------------------
// Content transfer
// ---------------------------------------------------------------------------

/// Copies a repository's full history, tags, and large-file objects.
#[async_trait]
pub trait ContentTransfer: Send + Sync {
    /// Mirrors `source` into `target`. Never fails with an error; every
    /// failure, including timeouts, is reported in the [`TransferOutcome`].
    async fn transfer_all(&self, source: &RepositoryPath, target: &RepositoryPath) -> TransferOutcome;
}

// ---------------------------------------------------------------------------
// Progress store
// ---------------------------------------------------------------------------

/// Durable record of migration progress.
///
/// Implementations must treat every method as one atomic read-modify-write
/// cycle under a single store-wide guard. Reads never fail because of a
/// corrupt backing document; they fail only if a required write-back fails.
pub trait ProgressStore: Send + Sync {
    /// `true` iff both the content and the issue set of `repo` are complete.
    fn is_repository_done(&self, repo: &RepositoryName) -> Result<bool, CheckpointError>;
    fn is_content_done(&self, repo: &RepositoryName) -> Result<bool, CheckpointError>;
    fn is_issue_set_done(&self, repo: &RepositoryName) -> Result<bool, CheckpointError>;

    fn mark_content_done(&self, repo: &RepositoryName) -> Result<(), CheckpointError>;
    fn mark_issue_set_done(&self, repo: &RepositoryName) -> Result<(), CheckpointError>;
    /// Marks both the content and the issue set complete.
    fn mark_repository_done(&self, repo: &RepositoryName) -> Result<(), CheckpointError>;

    fn is_issue_done(&self, repo: &RepositoryName, number: IssueNumber) -> Result<bool, CheckpointError>;
    fn mark_issue_done(&self, repo: &RepositoryName, number: IssueNumber) -> Result<(), CheckpointError>;

    /// Count of comments already replayed for a source issue; 0 if unseen.
    fn comment_cursor(&self, repo: &RepositoryName, number: IssueNumber) -> Result<u64, CheckpointError>;
    fn set_comment_cursor(
        &self,
        repo: &RepositoryName,
        number: IssueNumber,
        value: u64,
    ) -> Result<(), CheckpointError>;

    /// Target issue number recorded when the source issue was replayed.
    fn target_issue(
        &self,
        repo: &RepositoryName,
        number: IssueNumber,
    ) -> Result<Option<IssueNumber>, CheckpointError>;
    fn set_target_issue(
        &self,
        repo: &RepositoryName,
        number: IssueNumber,
        target: IssueNumber,
    ) -> Result<(), CheckpointError>;

    fn completed_repositories(&self) -> Result<BTreeSet<RepositoryName>, CheckpointError>;
    fn completed_issues(&self, repo: &RepositoryName) -> Result<BTreeSet<IssueNumber>, CheckpointError>;

    /// A copy of the whole document, for reporting.
    fn snapshot(&self) -> Result<CheckpointDocument, CheckpointError>;
}
