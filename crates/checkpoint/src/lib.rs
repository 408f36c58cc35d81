//! Durable checkpoint store backed by a single JSON document.
//!
//! Implements [`migration::ProgressStore`]. Every operation, queries included,
//! runs as one cycle under a store-wide guard:
//!
//! 1. acquire the guard
//! 2. read and parse the whole document (missing, empty, or corrupt text is
//!    an empty document)
//! 3. apply the change
//! 4. rewrite the whole document if anything changed, or if the document was
//!    upgraded from the legacy layout
//! 5. release the guard
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** File handling and the exclusive-access guard live here;
//! the document model and its upgrade rules live in [`migration::checkpoint`].
//!
//! ## Crash safety
//!
//! Rewrites go to a temporary file in the same directory which is then renamed
//! over the document. A crash at any point leaves either the previous or the
//! new document on disk, never a truncated one.

use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use migration::{
    CheckpointDocument, CheckpointError, DocumentHealth, IssueNumber, ProgressStore,
    RepositoryName, RepositoryRecord,
};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// File-backed [`ProgressStore`].
#[derive(Debug)]
pub struct JsonCheckpointStore {
    path: PathBuf,
    guard: Mutex<()>,
}

impl JsonCheckpointStore {
    /// Opens the store at `path`, creating an empty document if the file does
    /// not exist yet.
    ///
    /// # Errors
    ///
    /// [`CheckpointError::Io`] if a missing document cannot be created.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CheckpointError> {
        let store = Self {
            path: path.into(),
            guard: Mutex::new(()),
        };
        if !store.path.exists() {
            info!(path = %store.path.display(), "creating checkpoint document");
            store.write(&CheckpointDocument::default())?;
        }
        Ok(store)
    }

    /// Location of the backing document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> (CheckpointDocument, DocumentHealth) {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "checkpoint unreadable; treating as empty");
                String::new()
            }
        };

        let (document, health) = CheckpointDocument::parse(&text);
        match &health {
            DocumentHealth::Corrupt(reason) => {
                warn!(path = %self.path.display(), %reason, "checkpoint corrupt; treating as empty");
            }
            DocumentHealth::Upgraded => {
                info!(path = %self.path.display(), "upgrading legacy checkpoint document");
            }
            DocumentHealth::Current | DocumentHealth::Empty => {}
        }
        (document, health)
    }

    fn write(&self, document: &CheckpointDocument) -> Result<(), CheckpointError> {
        let io_error = |source: std::io::Error| CheckpointError::Io {
            path: self.path.clone(),
            source,
        };

        let json = document.to_json_pretty()?;
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let mut tmp = NamedTempFile::new_in(dir).map_err(io_error)?;
        tmp.write_all(json.as_bytes()).map_err(io_error)?;
        tmp.write_all(b"\n").map_err(io_error)?;
        tmp.as_file().sync_all().map_err(io_error)?;
        tmp.persist(&self.path).map_err(|e| io_error(e.error))?;
        debug!(path = %self.path.display(), "checkpoint written");
        Ok(())
    }

    /// Runs one guarded read-modify-write cycle.
    ///
    /// `apply` returns its result and whether it changed the document.
    fn cycle<T>(
        &self,
        apply: impl FnOnce(&mut CheckpointDocument) -> (T, bool),
    ) -> Result<T, CheckpointError> {
        // The guard protects the file, not in-memory state; poisoning is harmless.
        let _held = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        let (mut document, health) = self.read();
        let (value, changed) = apply(&mut document);
        if changed || health == DocumentHealth::Upgraded {
            self.write(&document)?;
        }
        Ok(value)
    }

    /// Query on a repository record, creating it on first reference.
    fn query_repository<T>(
        &self,
        repo: &RepositoryName,
        read: impl FnOnce(&RepositoryRecord) -> T,
    ) -> Result<T, CheckpointError> {
        self.cycle(|doc| {
            let (record, created) = doc.ensure_repository(repo);
            (read(record), created)
        })
    }

    fn update_repository(
        &self,
        repo: &RepositoryName,
        update: impl FnOnce(&mut RepositoryRecord),
    ) -> Result<(), CheckpointError> {
        self.cycle(|doc| {
            let (record, _) = doc.ensure_repository(repo);
            update(record);
            ((), true)
        })
    }
}

impl ProgressStore for JsonCheckpointStore {
    fn is_repository_done(&self, repo: &RepositoryName) -> Result<bool, CheckpointError> {
        self.query_repository(repo, RepositoryRecord::is_done)
    }

    fn is_content_done(&self, repo: &RepositoryName) -> Result<bool, CheckpointError> {
        self.query_repository(repo, |r| r.content_completed)
    }

    fn is_issue_set_done(&self, repo: &RepositoryName) -> Result<bool, CheckpointError> {
        self.query_repository(repo, |r| r.issues_completed)
    }

    fn mark_content_done(&self, repo: &RepositoryName) -> Result<(), CheckpointError> {
        self.update_repository(repo, |r| r.content_completed = true)
    }

    fn mark_issue_set_done(&self, repo: &RepositoryName) -> Result<(), CheckpointError> {
        self.update_repository(repo, |r| r.issues_completed = true)
    }

    fn mark_repository_done(&self, repo: &RepositoryName) -> Result<(), CheckpointError> {
        self.update_repository(repo, |r| {
            r.content_completed = true;
            r.issues_completed = true;
        })
    }

    fn is_issue_done(&self, repo: &RepositoryName, number: IssueNumber) -> Result<bool, CheckpointError> {
        self.cycle(|doc| {
            let done = doc
                .repository(repo)
                .and_then(|r| r.issue(number))
                .is_some_and(|i| i.completed);
            (done, false)
        })
    }

    fn mark_issue_done(&self, repo: &RepositoryName, number: IssueNumber) -> Result<(), CheckpointError> {
        self.update_repository(repo, |r| r.issue_mut(number).completed = true)
    }

    fn comment_cursor(&self, repo: &RepositoryName, number: IssueNumber) -> Result<u64, CheckpointError> {
        self.cycle(|doc| {
            let cursor = doc
                .repository(repo)
                .and_then(|r| r.issue(number))
                .map_or(0, |i| i.comments_completed);
            (cursor, false)
        })
    }

    fn set_comment_cursor(
        &self,
        repo: &RepositoryName,
        number: IssueNumber,
        value: u64,
    ) -> Result<(), CheckpointError> {
        self.update_repository(repo, |r| r.issue_mut(number).comments_completed = value)
    }

    fn target_issue(
        &self,
        repo: &RepositoryName,
        number: IssueNumber,
    ) -> Result<Option<IssueNumber>, CheckpointError> {
        self.cycle(|doc| {
            let target = doc
                .repository(repo)
                .and_then(|r| r.issue(number))
                .and_then(|i| i.target_number);
            (target, false)
        })
    }

    fn set_target_issue(
        &self,
        repo: &RepositoryName,
        number: IssueNumber,
        target: IssueNumber,
    ) -> Result<(), CheckpointError> {
        self.update_repository(repo, |r| r.issue_mut(number).target_number = Some(target))
    }

    fn completed_repositories(&self) -> Result<BTreeSet<RepositoryName>, CheckpointError> {
        self.cycle(|doc| (doc.completed_repositories(), false))
    }

    fn completed_issues(&self, repo: &RepositoryName) -> Result<BTreeSet<IssueNumber>, CheckpointError> {
        self.cycle(|doc| (doc.completed_issues(repo), false))
    }

    fn snapshot(&self) -> Result<CheckpointDocument, CheckpointError> {
        self.cycle(|doc| (doc.clone(), false))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn repo(name: &str) -> RepositoryName {
        RepositoryName::new(name).unwrap()
    }

    fn store_in(dir: &tempfile::TempDir) -> JsonCheckpointStore {
        JsonCheckpointStore::open(dir.path().join("state.json")).unwrap()
    }

    fn read_json(store: &JsonCheckpointStore) -> serde_json::Value {
        serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap()
    }

    #[test]
    fn open_creates_empty_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert_eq!(read_json(&store), serde_json::json!({ "repositories": {} }));
    }

    #[test]
    fn panicked_holder_does_not_block_later_cycles() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(store_in(&dir));

        let panicking = Arc::clone(&store);
        let joined = std::thread::spawn(move || {
            let _: Result<(), _> = panicking.cycle(|_| panic!("apply failed"));
        })
        .join();
        assert!(joined.is_err());
        assert!(store.guard.is_poisoned());

        store.mark_content_done(&repo("widgets")).unwrap();
        assert!(store.is_content_done(&repo("widgets")).unwrap());
    }

    #[test]
    fn first_query_creates_all_false_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        assert!(!store.is_content_done(&repo("widgets")).unwrap());
        let json = read_json(&store);
        assert_eq!(
            json["repositories"]["widgets"],
            serde_json::json!({ "content_completed": false, "issues_completed": false, "issues": {} })
        );
    }

    #[test]
    fn repository_completion_is_conjunctive() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let a = repo("a");
        let b = repo("b");

        store.mark_content_done(&a).unwrap();
        assert!(!store.is_repository_done(&a).unwrap());

        store.mark_issue_set_done(&b).unwrap();
        assert!(!store.is_repository_done(&b).unwrap());

        store.mark_issue_set_done(&a).unwrap();
        assert!(store.is_repository_done(&a).unwrap());

        store.mark_repository_done(&b).unwrap();
        store.mark_repository_done(&b).unwrap();
        assert!(store.is_repository_done(&b).unwrap());
        assert_eq!(store.completed_repositories().unwrap(), BTreeSet::from([a, b]));
    }

    #[test]
    fn issue_progress_round_trips_through_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let r = repo("widgets");
        {
            let store = JsonCheckpointStore::open(&path).unwrap();
            assert_eq!(store.comment_cursor(&r, IssueNumber::new(4)).unwrap(), 0);
            store.set_comment_cursor(&r, IssueNumber::new(4), 2).unwrap();
            store.set_target_issue(&r, IssueNumber::new(4), IssueNumber::new(4)).unwrap();
            store.mark_issue_done(&r, IssueNumber::new(1)).unwrap();
        }

        let reopened = JsonCheckpointStore::open(&path).unwrap();
        assert_eq!(reopened.comment_cursor(&r, IssueNumber::new(4)).unwrap(), 2);
        assert_eq!(
            reopened.target_issue(&r, IssueNumber::new(4)).unwrap(),
            Some(IssueNumber::new(4))
        );
        assert!(reopened.is_issue_done(&r, IssueNumber::new(1)).unwrap());
        assert!(!reopened.is_issue_done(&r, IssueNumber::new(4)).unwrap());
        assert_eq!(
            reopened.completed_issues(&r).unwrap(),
            BTreeSet::from([IssueNumber::new(1)])
        );
    }

    #[test]
    fn corrupt_document_is_treated_as_empty_and_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = JsonCheckpointStore::open(&path).unwrap();
        assert!(!store.is_repository_done(&repo("a")).unwrap());
        assert!(store.completed_repositories().unwrap().is_empty());

        store.mark_issue_done(&repo("a"), IssueNumber::new(1)).unwrap();
        assert_eq!(read_json(&store)["repositories"]["a"]["issues"]["1"]["completed"], true);
    }

    #[test]
    fn empty_file_is_treated_as_empty_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "").unwrap();

        let store = JsonCheckpointStore::open(&path).unwrap();
        assert_eq!(store.comment_cursor(&repo("a"), IssueNumber::new(9)).unwrap(), 0);
    }

    #[test]
    fn legacy_document_is_upgraded_and_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(
            &path,
            r#"{"repositories": {"widgets": {"completed": false, "issues": {"1": {"completed": true}}}}}"#,
        )
        .unwrap();

        let store = JsonCheckpointStore::open(&path).unwrap();
        let widgets = repo("widgets");
        assert!(store.is_issue_set_done(&widgets).unwrap());
        assert!(!store.is_content_done(&widgets).unwrap());
        assert!(store.is_issue_done(&widgets, IssueNumber::new(1)).unwrap());

        let json = read_json(&store);
        let record = &json["repositories"]["widgets"];
        assert_eq!(record["issues_completed"], true);
        assert_eq!(record["content_completed"], false);
        assert!(record.get("completed").is_none());
        assert_eq!(record["issues"]["1"]["completed"], true);
    }

    #[test]
    fn concurrent_writers_do_not_lose_updates() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(store_in(&dir));

        let handles: Vec<_> = (0..8u64)
            .map(|worker| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    let r = repo(&format!("repo-{}", worker % 2));
                    for n in 0..10u64 {
                        store
                            .mark_issue_done(&r, IssueNumber::new(worker * 100 + n))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let total: usize = ["repo-0", "repo-1"]
            .iter()
            .map(|name| store.completed_issues(&repo(name)).unwrap().len())
            .sum();
        assert_eq!(total, 80);
    }
}
