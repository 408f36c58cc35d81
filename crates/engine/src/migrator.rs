//! The migration orchestrator.
//!
//! [`Migrator`] walks each source repository through
//! `NotStarted → ContentPending → IssuesPending → Done`, deriving the phase
//! from the progress store on every entry so that a re-run resumes exactly
//! where a crashed or interrupted run stopped.
//!
//! ## Unit discipline
//!
//! Every unit (content, issue set, issue, comment) is marked complete only
//! after its remote side effect is confirmed. Shutdown requests are honoured
//! before a unit starts, never between a confirmed write and the checkpoint
//! update that records it.
//!
//! ## Numbering
//!
//! The target assigns issue numbers sequentially and ignores caller-supplied
//! numbers. Issues are therefore replayed for every number from the lowest to
//! the highest source number, and numbers missing on the source are filled
//! with closed placeholder issues.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use migration::{
    attribution, CommentDescriptor, ContentTransfer, IssueComments, IssueDescriptor, IssueNumber,
    IssueState, MigrationError, MigrationRunId, MigrationSettings, ProgressStore, RemoteClient,
    RemoteError, RepositoryDescriptor, RepositoryName, RepositoryPath, TransferOutcome,
};
use tracing::{debug, error, info, instrument, warn, Instrument};

use crate::rate_governor::{RateClass, RateGovernor};
use crate::shutdown::ShutdownSignal;

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Where a repository stands, derived from the progress store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryPhase {
    /// Nothing recorded yet.
    NotStarted,
    /// Content transfer is enabled and not yet complete.
    ContentPending,
    /// Content is complete (or disabled); the issue set is not.
    IssuesPending,
    Done,
}

/// Result of one pass over a repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositoryOutcome {
    /// Every enabled unit is complete.
    Completed,
    /// Issues are complete but the content transfer failed. The content unit
    /// stays pending and is retried by the next run.
    ContentPending { reason: String },
    /// At least one unit failed; the progress store holds the resume point.
    Failed { reason: String },
    /// Shutdown was requested; the run stopped at a unit boundary.
    Interrupted,
}

/// Result of a whole organization run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every pending repository was processed. Repositories whose content
    /// transfer failed are listed in `content_pending`.
    Completed {
        repositories: usize,
        content_pending: Vec<RepositoryName>,
    },
    /// The run stopped at the first repository that failed.
    Failed {
        repository: RepositoryName,
        reason: String,
    },
    Interrupted,
}

// ---------------------------------------------------------------------------
// Migrator
// ---------------------------------------------------------------------------

/// Drives repositories, issues, and comments from the source organization to
/// the target organization.
pub struct Migrator {
    settings: MigrationSettings,
    remote: Arc<dyn RemoteClient>,
    transfer: Arc<dyn ContentTransfer>,
    store: Arc<dyn ProgressStore>,
    governor: Arc<RateGovernor>,
    shutdown: ShutdownSignal,
    run_id: MigrationRunId,
}

impl Migrator {
    /// Creates a migrator with a fresh rate governor built from the settings'
    /// limits.
    ///
    /// # Errors
    ///
    /// [`MigrationError::Configuration`] if the settings do not validate.
    pub fn new(
        settings: MigrationSettings,
        remote: Arc<dyn RemoteClient>,
        transfer: Arc<dyn ContentTransfer>,
        store: Arc<dyn ProgressStore>,
    ) -> Result<Self, MigrationError> {
        settings.validate()?;
        let governor = Arc::new(RateGovernor::new(settings.rate_limits));
        let run_id = MigrationRunId::new_random();
        info!(
            %run_id,
            source = %settings.source_org,
            target = %settings.target_org,
            content = settings.migrate_content,
            "initialised migrator"
        );
        Ok(Self {
            settings,
            remote,
            transfer,
            store,
            governor,
            shutdown: ShutdownSignal::new(),
            run_id,
        })
    }

    /// Uses `shutdown` instead of the migrator's private signal.
    #[must_use]
    pub fn with_shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = shutdown;
        self
    }

    fn source_path(&self, name: &RepositoryName) -> RepositoryPath {
        RepositoryPath::new(self.settings.source_org.clone(), name.clone())
    }

    fn target_path(&self, name: &RepositoryName) -> RepositoryPath {
        RepositoryPath::new(self.settings.target_org.clone(), name.clone())
    }

    fn ensure_running(&self) -> Result<(), MigrationError> {
        if self.shutdown.is_requested() {
            Err(MigrationError::Interrupted)
        } else {
            Ok(())
        }
    }

    /// Waits for room in `class`, performs `write`, and records it.
    ///
    /// The write is recorded whether or not it succeeded; a rejected request
    /// still counts against the platform's budget.
    async fn governed<T>(
        &self,
        class: RateClass,
        write: impl Future<Output = Result<T, RemoteError>>,
    ) -> Result<T, RemoteError> {
        self.governor.block_until_allowed(class).await;
        let result = write.await;
        self.governor.record_operation(class);
        result
    }

    // -----------------------------------------------------------------------
    // Phase derivation
    // -----------------------------------------------------------------------

    /// Derives the repository's phase from the progress store.
    ///
    /// With content transfer disabled, the content flag does not gate `Done`.
    pub fn phase(&self, name: &RepositoryName) -> Result<RepositoryPhase, MigrationError> {
        let content_done = self.store.is_content_done(name)?;
        let issues_done = self.store.is_issue_set_done(name)?;
        let content_satisfied = content_done || !self.settings.migrate_content;

        let phase = if content_satisfied && issues_done {
            RepositoryPhase::Done
        } else if !content_done && !issues_done && self.store.completed_issues(name)?.is_empty() {
            RepositoryPhase::NotStarted
        } else if !content_satisfied {
            RepositoryPhase::ContentPending
        } else {
            RepositoryPhase::IssuesPending
        };
        Ok(phase)
    }

    // -----------------------------------------------------------------------
    // Organization level
    // -----------------------------------------------------------------------

    /// Lists source repositories that are selected and not yet done.
    pub async fn repositories_to_migrate(&self) -> Result<Vec<RepositoryDescriptor>, MigrationError> {
        info!(org = %self.settings.source_org, "listing source repositories");
        let all = self.remote.list_repositories(&self.settings.source_org).await?;

        for wanted in &self.settings.only_repositories {
            if !all.iter().any(|r| &r.name == wanted) {
                warn!(repository = %wanted, "requested repository not found on source");
            }
        }

        let mut pending = Vec::new();
        for repo in all {
            if !self.settings.includes(&repo.name) {
                continue;
            }
            if self.phase(&repo.name)? == RepositoryPhase::Done {
                info!(repository = %repo.name, "already completed; skipping");
            } else {
                pending.push(repo);
            }
        }
        info!(count = pending.len(), "repositories to migrate");
        Ok(pending)
    }

    /// Migrates every pending repository in order, stopping at the first
    /// failure. Repositories whose content transfer failed do not stop the
    /// run; they are listed in [`RunOutcome::Completed`].
    ///
    /// # Errors
    ///
    /// Fails only if the repository listing or the initial progress queries
    /// fail. Per-repository failures are reported in the [`RunOutcome`].
    pub async fn migrate_organization(&self) -> Result<RunOutcome, MigrationError> {
        let span = tracing::info_span!(
            "migrate_organization",
            run_id = %self.run_id,
            source = %self.settings.source_org,
            target = %self.settings.target_org,
        );
        self.run_organization().instrument(span).await
    }

    async fn run_organization(&self) -> Result<RunOutcome, MigrationError> {
        info!("starting organization migration");
        let pending = self.repositories_to_migrate().await?;
        let total = pending.len();
        let mut content_pending = Vec::new();

        for (index, repo) in pending.iter().enumerate() {
            if self.shutdown.is_requested() {
                warn!("shutdown requested; stopping before next repository");
                return Ok(RunOutcome::Interrupted);
            }
            info!("[{}/{}] processing {}", index + 1, total, repo.name);

            match self.migrate_repository(&repo.name).await {
                RepositoryOutcome::Completed => {}
                RepositoryOutcome::ContentPending { reason } => {
                    warn!(
                        repository = %repo.name,
                        %reason,
                        "content left pending; continuing with next repository"
                    );
                    content_pending.push(repo.name.clone());
                }
                RepositoryOutcome::Failed { reason } => {
                    error!(repository = %repo.name, %reason, "migration failed");
                    return Ok(RunOutcome::Failed {
                        repository: repo.name.clone(),
                        reason,
                    });
                }
                RepositoryOutcome::Interrupted => return Ok(RunOutcome::Interrupted),
            }
            self.log_progress(index + 1, total);
        }

        info!(
            repositories = total,
            content_pending = content_pending.len(),
            "organization migration completed"
        );
        Ok(RunOutcome::Completed {
            repositories: total,
            content_pending,
        })
    }

    fn log_progress(&self, done: usize, total: usize) {
        let stats = self.governor.stats();
        let usage = |class: RateClass| {
            stats
                .get(&class)
                .map(|s| format!("{}/{}", s.in_window, s.ceiling))
                .unwrap_or_default()
        };
        info!(
            done,
            total,
            issues = %usage(RateClass::Issue),
            comments = %usage(RateClass::Comment),
            "progress"
        );
    }

    // -----------------------------------------------------------------------
    // Repository level
    // -----------------------------------------------------------------------

    /// Runs one pass over a repository.
    ///
    /// Never fails: errors are caught at this boundary, logged, and reported
    /// as [`RepositoryOutcome::Failed`] with the progress store untouched
    /// beyond the last completed unit.
    pub async fn migrate_repository(&self, name: &RepositoryName) -> RepositoryOutcome {
        let span = tracing::info_span!("migrate_repository", repository = %name);
        match self.run_repository(name).instrument(span).await {
            Ok(outcome) => outcome,
            Err(MigrationError::Interrupted) => {
                warn!(repository = %name, "interrupted; re-run to resume");
                RepositoryOutcome::Interrupted
            }
            Err(e) => {
                error!(repository = %name, error = %e, "repository migration failed");
                RepositoryOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn run_repository(&self, name: &RepositoryName) -> Result<RepositoryOutcome, MigrationError> {
        let phase = self.phase(name)?;
        if phase == RepositoryPhase::Done {
            info!("already completed; skipping");
            return Ok(RepositoryOutcome::Completed);
        }
        self.ensure_running()?;
        info!(?phase, "starting repository");

        if phase == RepositoryPhase::NotStarted {
            self.create_target_repository(name).await?;
        }

        let content_failure = if self.settings.migrate_content {
            self.transfer_content(name).await?
        } else {
            info!("content transfer disabled; skipping");
            None
        };

        if self.store.is_issue_set_done(name)? {
            debug!("issue set already completed");
        } else {
            self.ensure_running()?;
            let issues = self.remote.list_issues(&self.source_path(name)).await?;
            info!(count = issues.len(), "fetched source issues");
            self.replay_issues(name, &issues).await?;
            self.store.mark_issue_set_done(name)?;
            info!("issue set completed");
        }

        Ok(match content_failure {
            Some(reason) => RepositoryOutcome::ContentPending { reason },
            None => {
                info!("repository completed");
                RepositoryOutcome::Completed
            }
        })
    }

    async fn create_target_repository(&self, name: &RepositoryName) -> Result<(), MigrationError> {
        let org = &self.settings.target_org;
        let description = format!("Migrated from {}", self.source_path(name));
        match self
            .remote
            .create_repository(org, name, self.settings.private_repositories, &description)
            .await
        {
            Ok(_) => {
                info!(target = %self.target_path(name), "created target repository");
                Ok(())
            }
            Err(e) if e.is_already_exists() => {
                info!(target = %self.target_path(name), "target repository already exists; continuing");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Transfers content unless already done. Returns the failure reason if
    /// the transfer failed; a failure here fails the content unit only.
    async fn transfer_content(&self, name: &RepositoryName) -> Result<Option<String>, MigrationError> {
        if self.store.is_content_done(name)? {
            debug!("content already transferred");
            return Ok(None);
        }
        self.ensure_running()?;

        let source = self.source_path(name);
        let target = self.target_path(name);
        info!(%source, %target, "transferring repository content");
        match self.transfer.transfer_all(&source, &target).await {
            TransferOutcome::Succeeded => {
                self.store.mark_content_done(name)?;
                info!("content transfer completed");
                Ok(None)
            }
            TransferOutcome::Failed {
                reason,
                diagnostics,
            } => {
                warn!(%reason, %diagnostics, "content transfer failed; continuing with issues");
                Ok(Some(format!("content transfer {reason}: {diagnostics}")))
            }
        }
    }

    // -----------------------------------------------------------------------
    // Issue level
    // -----------------------------------------------------------------------

    /// Replays every number from the lowest to the highest source issue,
    /// filling gaps with closed placeholders.
    pub async fn replay_issues(
        &self,
        name: &RepositoryName,
        issues: &[IssueDescriptor],
    ) -> Result<(), MigrationError> {
        let by_number: BTreeMap<IssueNumber, &IssueDescriptor> =
            issues.iter().map(|issue| (issue.number, issue)).collect();
        let (Some(first), Some(last)) = (by_number.keys().next(), by_number.keys().next_back()) else {
            info!("no issues to replay");
            return Ok(());
        };
        info!(first = %first, last = %last, present = by_number.len(), "replaying issues");

        for number in (first.as_u64()..=last.as_u64()).map(IssueNumber::new) {
            self.ensure_running()?;
            if self.store.is_issue_done(name, number)? {
                debug!(issue = %number, "already completed; skipping");
                continue;
            }
            match by_number.get(&number) {
                Some(issue) => self.replay_issue(name, issue).await?,
                None => self.replay_placeholder(name, number).await?,
            }
        }
        Ok(())
    }

    /// Creates the target issue, or reuses the one recorded by an earlier
    /// pass, and records its number.
    async fn ensure_target_issue(
        &self,
        name: &RepositoryName,
        source_number: IssueNumber,
        title: &str,
        body: &str,
    ) -> Result<IssueNumber, MigrationError> {
        if let Some(existing) = self.store.target_issue(name, source_number)? {
            info!(target_issue = %existing, "issue already created by an earlier pass");
            return Ok(existing);
        }

        let target = self.target_path(name);
        let created = self
            .governed(RateClass::Issue, self.remote.create_issue(&target, title, body))
            .await?;
        self.store.set_target_issue(name, source_number, created.number)?;

        if created.number != source_number {
            warn!(
                source_issue = %source_number,
                target_issue = %created.number,
                "target assigned a different number; numbering has drifted"
            );
        }
        Ok(created.number)
    }

    async fn close_target_issue(&self, name: &RepositoryName, number: IssueNumber) -> Result<(), MigrationError> {
        let target = self.target_path(name);
        self.governed(RateClass::Issue, self.remote.close_issue(&target, number))
            .await?;
        debug!(target_issue = %number, "closed");
        Ok(())
    }

    #[instrument(skip_all, fields(issue = %issue.number))]
    async fn replay_issue(&self, name: &RepositoryName, issue: &IssueDescriptor) -> Result<(), MigrationError> {
        info!(title = %issue.title, "replaying issue");
        let body = attribution::issue_body(issue, &self.source_path(name));
        let target_number = self
            .ensure_target_issue(name, issue.number, &issue.title, &body)
            .await?;

        let comments = self.resolve_comments(name, issue).await;
        self.replay_comments(name, issue.number, target_number, &comments)
            .await?;

        if issue.state == IssueState::Closed {
            self.close_target_issue(name, target_number).await?;
        }

        self.store.mark_issue_done(name, issue.number)?;
        info!(target_issue = %target_number, "issue completed");
        Ok(())
    }

    #[instrument(skip_all, fields(issue = %number))]
    async fn replay_placeholder(&self, name: &RepositoryName, number: IssueNumber) -> Result<(), MigrationError> {
        info!("creating placeholder for missing issue");
        let title = attribution::placeholder_title(number);
        let body = attribution::placeholder_body(number, &self.source_path(name));
        let target_number = self.ensure_target_issue(name, number, &title, &body).await?;

        self.close_target_issue(name, target_number).await?;
        self.store.mark_issue_done(name, number)?;
        info!(target_issue = %target_number, "placeholder created and closed");
        Ok(())
    }

    /// Resolves the comment payload to a concrete ordered list.
    ///
    /// A failure to fetch a counted list is logged and treated as no comments:
    /// the issue itself is worth more than its discussion.
    async fn resolve_comments(&self, name: &RepositoryName, issue: &IssueDescriptor) -> Vec<CommentDescriptor> {
        match &issue.comments {
            IssueComments::List(list) => list.clone(),
            IssueComments::Count(0) => Vec::new(),
            IssueComments::Count(count) => {
                info!(count, "fetching comments");
                match self
                    .remote
                    .list_issue_comments(&self.source_path(name), issue.number)
                    .await
                {
                    Ok(list) => list,
                    Err(e) => {
                        error!(error = %e, "failed to fetch comments; continuing without them");
                        Vec::new()
                    }
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Comment level
    // -----------------------------------------------------------------------

    /// Replays comments in order, resuming after the stored cursor.
    ///
    /// The cursor is persisted after every comment, so a failure leaves it at
    /// the failed comment's index.
    pub async fn replay_comments(
        &self,
        name: &RepositoryName,
        source_number: IssueNumber,
        target_number: IssueNumber,
        comments: &[CommentDescriptor],
    ) -> Result<(), MigrationError> {
        if comments.is_empty() {
            return Ok(());
        }
        let total = comments.len();
        let cursor = self.store.comment_cursor(name, source_number)?;
        let skip = usize::try_from(cursor).unwrap_or(usize::MAX);
        if skip > total {
            warn!(cursor, total, "comment cursor is past the source comments");
        }
        info!(total, starting_at = skip + 1, "replaying comments");

        let source = self.source_path(name);
        let target = self.target_path(name);
        for (index, comment) in comments.iter().enumerate().skip(skip) {
            self.ensure_running()?;
            let body = attribution::comment_body(comment, &source);
            self.governed(
                RateClass::Comment,
                self.remote.create_issue_comment(&target, target_number, &body),
            )
            .await
            .inspect_err(|e| error!(comment = index + 1, total, error = %e, "failed to create comment"))?;

            let replayed = index as u64 + 1;
            self.store.set_comment_cursor(name, source_number, replayed)?;
            debug!(comment = replayed, total, "comment replayed");
        }
        Ok(())
    }
}
