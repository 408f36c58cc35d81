//! In-memory collaborators for orchestrator scenario tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use checkpoint::JsonCheckpointStore;
use engine::{Migrator, ShutdownSignal};
use migration::{
    CommentDescriptor, ContentTransfer, CreatedIssue, IssueComments, IssueDescriptor, IssueNumber,
    IssueState, MigrationSettings, OrganizationName, RateLimits, RemoteClient, RemoteError,
    RepositoryDescriptor, RepositoryName, RepositoryPath, Timestamp, TransferFailure,
    TransferOutcome,
};
use tempfile::TempDir;

pub const SOURCE: &str = "old-org";
pub const TARGET: &str = "new-org";

/// A remote write observed by the fake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Write {
    CreateRepository { name: String },
    CreateIssue { repo: String, number: u64, title: String, body: String },
    CloseIssue { repo: String, number: u64 },
    CreateComment { repo: String, number: u64, body: String },
}

#[derive(Default)]
struct State {
    repositories: Vec<String>,
    issues: HashMap<String, Vec<IssueDescriptor>>,
    comments: HashMap<(String, u64), Vec<CommentDescriptor>>,
    last_issue: HashMap<String, u64>,
    existing_targets: HashSet<String>,
    create_repository_error: Option<RemoteError>,
    fail_comment_containing: Option<String>,
    fail_list_comments: bool,
    shutdown_after_issue_creations: Option<(usize, ShutdownSignal)>,
    issue_creations: usize,
    writes: Vec<Write>,
}

/// Fake platform: sequential issue numbering per target repository and a log
/// of every write.
#[derive(Default)]
pub struct FakeRemote {
    state: Mutex<State>,
}

impl FakeRemote {
    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn add_repository(&self, name: &str, issues: Vec<IssueDescriptor>) {
        let mut state = self.state();
        state.repositories.push(name.to_owned());
        state.issues.insert(format!("{SOURCE}/{name}"), issues);
    }

    pub fn set_comments(&self, repo: &str, number: u64, comments: Vec<CommentDescriptor>) {
        self.state()
            .comments
            .insert((format!("{SOURCE}/{repo}"), number), comments);
    }

    pub fn mark_target_existing(&self, name: &str) {
        self.state().existing_targets.insert(name.to_owned());
    }

    pub fn fail_repository_creation(&self, error: RemoteError) {
        self.state().create_repository_error = Some(error);
    }

    pub fn fail_comment_containing(&self, needle: Option<&str>) {
        self.state().fail_comment_containing = needle.map(str::to_owned);
    }

    pub fn fail_list_comments(&self, fail: bool) {
        self.state().fail_list_comments = fail;
    }

    pub fn shutdown_after_issue_creations(&self, count: usize, signal: ShutdownSignal) {
        self.state().shutdown_after_issue_creations = Some((count, signal));
    }

    pub fn writes(&self) -> Vec<Write> {
        self.state().writes.clone()
    }

    pub fn clear_writes(&self) {
        self.state().writes.clear();
    }

    pub fn created_issues(&self) -> Vec<(u64, String)> {
        self.writes()
            .into_iter()
            .filter_map(|w| match w {
                Write::CreateIssue { number, title, .. } => Some((number, title)),
                _ => None,
            })
            .collect()
    }

    pub fn closed_issues(&self) -> Vec<u64> {
        self.writes()
            .into_iter()
            .filter_map(|w| match w {
                Write::CloseIssue { number, .. } => Some(number),
                _ => None,
            })
            .collect()
    }

    pub fn created_comments(&self) -> Vec<(u64, String)> {
        self.writes()
            .into_iter()
            .filter_map(|w| match w {
                Write::CreateComment { number, body, .. } => Some((number, body)),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl RemoteClient for FakeRemote {
    async fn list_repositories(
        &self,
        _org: &OrganizationName,
    ) -> Result<Vec<RepositoryDescriptor>, RemoteError> {
        Ok(self
            .state()
            .repositories
            .iter()
            .map(|name| RepositoryDescriptor {
                name: RepositoryName::new(name.clone()).unwrap(),
                private: true,
                description: None,
            })
            .collect())
    }

    async fn create_repository(
        &self,
        _org: &OrganizationName,
        name: &RepositoryName,
        private: bool,
        description: &str,
    ) -> Result<RepositoryDescriptor, RemoteError> {
        let mut state = self.state();
        state.writes.push(Write::CreateRepository {
            name: name.to_string(),
        });
        if let Some(error) = state.create_repository_error.clone() {
            return Err(error);
        }
        if !state.existing_targets.insert(name.to_string()) {
            return Err(RemoteError::http(422, "name already exists on this account"));
        }
        Ok(RepositoryDescriptor {
            name: name.clone(),
            private,
            description: Some(description.to_owned()),
        })
    }

    async fn list_issues(&self, repo: &RepositoryPath) -> Result<Vec<IssueDescriptor>, RemoteError> {
        let mut issues = self
            .state()
            .issues
            .get(&repo.to_string())
            .cloned()
            .unwrap_or_default();
        issues.sort_by_key(|i| i.number);
        Ok(issues)
    }

    async fn create_issue(
        &self,
        repo: &RepositoryPath,
        title: &str,
        body: &str,
    ) -> Result<CreatedIssue, RemoteError> {
        let mut state = self.state();
        let key = repo.to_string();
        let number = {
            let last = state.last_issue.entry(key.clone()).or_insert(0);
            *last += 1;
            *last
        };
        state.writes.push(Write::CreateIssue {
            repo: key,
            number,
            title: title.to_owned(),
            body: body.to_owned(),
        });
        state.issue_creations += 1;
        if let Some((after, signal)) = &state.shutdown_after_issue_creations {
            if state.issue_creations >= *after {
                signal.request();
            }
        }
        Ok(CreatedIssue {
            number: IssueNumber::new(number),
        })
    }

    async fn close_issue(&self, repo: &RepositoryPath, number: IssueNumber) -> Result<(), RemoteError> {
        self.state().writes.push(Write::CloseIssue {
            repo: repo.to_string(),
            number: number.as_u64(),
        });
        Ok(())
    }

    async fn list_issue_comments(
        &self,
        repo: &RepositoryPath,
        number: IssueNumber,
    ) -> Result<Vec<CommentDescriptor>, RemoteError> {
        let state = self.state();
        if state.fail_list_comments {
            return Err(RemoteError::http(502, "Bad Gateway"));
        }
        Ok(state
            .comments
            .get(&(repo.to_string(), number.as_u64()))
            .cloned()
            .unwrap_or_default())
    }

    async fn create_issue_comment(
        &self,
        repo: &RepositoryPath,
        number: IssueNumber,
        body: &str,
    ) -> Result<(), RemoteError> {
        let mut state = self.state();
        if let Some(needle) = &state.fail_comment_containing {
            if body.contains(needle.as_str()) {
                return Err(RemoteError::http(500, "Internal Server Error"));
            }
        }
        state.writes.push(Write::CreateComment {
            repo: repo.to_string(),
            number: number.as_u64(),
            body: body.to_owned(),
        });
        Ok(())
    }
}

/// Fake content transfer with a configurable outcome.
pub struct FakeTransfer {
    outcome: Mutex<TransferOutcome>,
    calls: AtomicUsize,
}

impl Default for FakeTransfer {
    fn default() -> Self {
        Self {
            outcome: Mutex::new(TransferOutcome::Succeeded),
            calls: AtomicUsize::new(0),
        }
    }
}

impl FakeTransfer {
    pub fn fail_with(&self, reason: TransferFailure) {
        *self.outcome.lock().unwrap() = TransferOutcome::Failed {
            reason,
            diagnostics: "remote: refusing to allow a token without `workflow` scope".into(),
        };
    }

    pub fn succeed(&self) {
        *self.outcome.lock().unwrap() = TransferOutcome::Succeeded;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentTransfer for FakeTransfer {
    async fn transfer_all(&self, _source: &RepositoryPath, _target: &RepositoryPath) -> TransferOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcome.lock().unwrap().clone()
    }
}

/// Fakes plus a real checkpoint store in a temporary directory.
pub struct Harness {
    pub remote: Arc<FakeRemote>,
    pub transfer: Arc<FakeTransfer>,
    pub store: Arc<JsonCheckpointStore>,
    _dir: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonCheckpointStore::open(dir.path().join("migration_state.json")).unwrap();
        Self {
            remote: Arc::new(FakeRemote::default()),
            transfer: Arc::new(FakeTransfer::default()),
            store: Arc::new(store),
            _dir: dir,
        }
    }

    pub fn migrator(&self, settings: MigrationSettings) -> Migrator {
        Migrator::new(
            settings,
            self.remote.clone(),
            self.transfer.clone(),
            self.store.clone(),
        )
        .unwrap()
    }
}

/// Settings with ceilings high enough that tests never wait.
pub fn settings() -> MigrationSettings {
    let mut settings = MigrationSettings::new(
        OrganizationName::new(SOURCE).unwrap(),
        OrganizationName::new(TARGET).unwrap(),
    );
    settings.rate_limits = RateLimits {
        issues_per_minute: 10_000,
        comments_per_minute: 10_000,
    };
    settings
}

pub fn repo(name: &str) -> RepositoryName {
    RepositoryName::new(name).unwrap()
}

pub fn issue(number: u64, state: IssueState, comments: IssueComments) -> IssueDescriptor {
    IssueDescriptor {
        number: IssueNumber::new(number),
        title: format!("Issue {number}"),
        body: Some(format!("Body of issue {number}")),
        state,
        author: Some("octocat".into()),
        created_at: Timestamp::parse_rfc3339("2020-05-01T12:00:00Z"),
        comments,
    }
}

pub fn open_issue(number: u64) -> IssueDescriptor {
    issue(number, IssueState::Open, IssueComments::Count(0))
}

pub fn comment(body: &str) -> CommentDescriptor {
    CommentDescriptor {
        body: Some(body.to_owned()),
        author: Some("hubot".into()),
        created_at: Timestamp::parse_rfc3339("2020-05-02T08:30:00Z"),
    }
}
