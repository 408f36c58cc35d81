//! Mirror transfer of a repository's history, tags, and large-file objects.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use migration::{ContentTransfer, RepositoryPath, TransferFailure, TransferOutcome};
use tracing::{debug, info, instrument, warn};

use crate::git::{self, GitOutput, RunError};

pub const DEFAULT_GIT_HOST: &str = "github.com";

const CLONE_TIMEOUT: Duration = Duration::from_secs(300);
const PUSH_TIMEOUT: Duration = Duration::from_secs(600);
const QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Branches and tags only. A plain `--mirror` push would also try to push
/// the source's read-only `refs/pull/*` refs, which the target rejects.
const PUSH_REFSPECS: [&str; 2] = ["+refs/heads/*:refs/heads/*", "+refs/tags/*:refs/tags/*"];

/// [`ContentTransfer`] that shells out to `git`.
///
/// Each transfer works in its own temporary directory, removed when the
/// transfer returns.
#[derive(Debug, Clone)]
pub struct GitMirrorTransfer {
    token: String,
    host: String,
    program: PathBuf,
}

impl GitMirrorTransfer {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            host: DEFAULT_GIT_HOST.to_owned(),
            program: PathBuf::from("git"),
        }
    }

    /// Uses `host` instead of `github.com` in clone and push URLs.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Uses `program` instead of the `git` found on `PATH`.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    fn remote_url(&self, repo: &RepositoryPath) -> String {
        format!(
            "https://x-access-token:{}@{}/{}/{}.git",
            self.token, self.host, repo.owner, repo.name
        )
    }

    fn redact(&self, text: &str) -> String {
        redact(text, &self.token)
    }

    async fn git(&self, args: &[&str], cwd: Option<&Path>, limit: Duration) -> Result<GitOutput, RunError> {
        git::run(&self.program, args, cwd, limit).await
    }

    /// Outcome for a step that never ran to completion.
    fn step_failed(&self, error: RunError) -> TransferOutcome {
        let reason = match error {
            RunError::Spawn { .. } => TransferFailure::ToolUnavailable,
            RunError::TimedOut(_) => TransferFailure::TimedOut,
        };
        TransferOutcome::Failed {
            reason,
            diagnostics: self.redact(&error.to_string()),
        }
    }

    fn exited_with_error(&self, reason: TransferFailure, output: &GitOutput) -> TransferOutcome {
        TransferOutcome::Failed {
            reason,
            diagnostics: self.redact(output.stderr.trim()),
        }
    }

    async fn lfs_available(&self, repo_dir: &Path) -> bool {
        match self.git(&["lfs", "version"], Some(repo_dir), QUERY_TIMEOUT).await {
            Ok(output) => output.success,
            Err(_) => false,
        }
    }

    async fn transfer_lfs(&self, repo_dir: &Path, target_url: &str) -> Option<TransferOutcome> {
        if !self.lfs_available(repo_dir).await {
            debug!("git lfs not installed; skipping large-file objects");
            return None;
        }

        info!("fetching large-file objects");
        let fetch = self
            .git(&["lfs", "fetch", "--all", "origin"], Some(repo_dir), PUSH_TIMEOUT)
            .await;
        match fetch {
            Ok(output) if output.success => {}
            Ok(output) => return Some(self.exited_with_error(TransferFailure::LfsFailed, &output)),
            Err(e) => return Some(self.step_failed(e)),
        }

        info!("pushing large-file objects");
        let push = self
            .git(&["lfs", "push", "--all", target_url], Some(repo_dir), PUSH_TIMEOUT)
            .await;
        match push {
            Ok(output) if output.success => None,
            Ok(output) => {
                let reason = classify_push_failure(&output.stderr, TransferFailure::LfsFailed);
                Some(self.exited_with_error(reason, &output))
            }
            Err(e) => Some(self.step_failed(e)),
        }
    }
}

#[async_trait]
impl ContentTransfer for GitMirrorTransfer {
    #[instrument(skip_all, fields(source = %source, target = %target))]
    async fn transfer_all(&self, source: &RepositoryPath, target: &RepositoryPath) -> TransferOutcome {
        let workspace = match tempfile::Builder::new().prefix("org-migrate-").tempdir() {
            Ok(dir) => dir,
            Err(e) => {
                return TransferOutcome::Failed {
                    reason: TransferFailure::CloneFailed,
                    diagnostics: format!("failed to create working directory: {e}"),
                }
            }
        };
        let repo_dir = workspace.path().join(format!("{}.git", source.name));
        let repo_dir_arg = repo_dir.to_string_lossy().into_owned();
        let source_url = self.remote_url(source);
        let target_url = self.remote_url(target);

        info!("cloning source mirror");
        match self
            .git(
                &["clone", "--mirror", source_url.as_str(), repo_dir_arg.as_str()],
                None,
                CLONE_TIMEOUT,
            )
            .await
        {
            Ok(output) if output.success => {}
            Ok(output) => return self.exited_with_error(TransferFailure::CloneFailed, &output),
            Err(e) => return self.step_failed(e),
        }

        match self
            .git(&["for-each-ref", "--count=1"], Some(&repo_dir), QUERY_TIMEOUT)
            .await
        {
            Ok(output) if output.success && output.stdout.trim().is_empty() => {
                info!("source repository is empty; nothing to push");
                return TransferOutcome::Succeeded;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %self.redact(&e.to_string()), "could not inspect clone; pushing anyway");
            }
        }

        if let Some(failure) = self.transfer_lfs(&repo_dir, &target_url).await {
            return failure;
        }

        info!("pushing branches and tags");
        let mut args = vec!["push", target_url.as_str()];
        args.extend(PUSH_REFSPECS);
        match self.git(&args, Some(&repo_dir), PUSH_TIMEOUT).await {
            Ok(output) if output.success => {
                info!("content transfer finished");
                TransferOutcome::Succeeded
            }
            Ok(output) => {
                let reason = classify_push_failure(&output.stderr, TransferFailure::PushFailed);
                self.exited_with_error(reason, &output)
            }
            Err(e) => self.step_failed(e),
        }
    }
}

/// Recognises rejections caused by the token's scopes or the account's
/// permissions; anything else keeps `fallback`.
fn classify_push_failure(stderr: &str, fallback: TransferFailure) -> TransferFailure {
    let lower = stderr.to_ascii_lowercase();
    let scope_markers = [
        "without `workflow` scope",
        "workflow scope",
        "permission to",
        "permission denied",
        "the requested url returned error: 403",
    ];
    if scope_markers.iter().any(|m| lower.contains(m)) {
        TransferFailure::MissingScope
    } else {
        fallback
    }
}

/// Removes `token` and any URL userinfo (`scheme://user:secret@`) from text
/// that is about to be logged or stored.
fn redact(text: &str, token: &str) -> String {
    let mut cleaned = if token.is_empty() {
        text.to_owned()
    } else {
        text.replace(token, "***")
    };

    let mut searched = 0;
    while let Some(offset) = cleaned[searched..].find("://") {
        let start = searched + offset + 3;
        let authority_end = cleaned[start..]
            .find(|c: char| c == '/' || c.is_whitespace() || c == '\'' || c == '"')
            .map_or(cleaned.len(), |i| start + i);
        if let Some(at) = cleaned[start..authority_end].rfind('@') {
            cleaned.replace_range(start..start + at, "***");
            searched = start + 4;
        } else {
            searched = start;
        }
    }
    cleaned
}
