//! The checkpoint document: the durable record of migration progress.
//!
//! The document is a plain data model. Reading it from text, upgrading older
//! layouts, and rendering it back are pure functions here; the file handling
//! and the exclusive-access guard live in the `checkpoint` infrastructure
//! crate.
//!
//! ## Layout
//!
//! ```json
//! {
//!   "repositories": {
//!     "widgets": {
//!       "content_completed": true,
//!       "issues_completed": false,
//!       "issues": {
//!         "1": { "completed": true, "comments_completed": 3, "target_number": 1 }
//!       }
//!     }
//!   }
//! }
//! ```
//!
//! ## Legacy layout
//!
//! Older documents carried a single `completed` flag per repository. On load,
//! `content_completed` becomes `false` (content is unverified) and
//! `issues_completed` becomes `true` iff any issue record is completed. The
//! legacy flag is dropped and the caller is told to persist the upgrade.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{IssueNumber, RepositoryName};

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Progress for one source issue (or the placeholder occupying its number).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueRecord {
    #[serde(default)]
    pub completed: bool,

    /// Count of comments already replayed, in source order.
    #[serde(default)]
    pub comments_completed: u64,

    /// Number the target assigned when the issue was created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_number: Option<IssueNumber>,
}

/// Progress for one repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepositoryRecord {
    pub content_completed: bool,
    pub issues_completed: bool,
    /// Keyed by the stringified source issue number.
    pub issues: BTreeMap<String, IssueRecord>,
}

impl RepositoryRecord {
    /// A repository is done only when both its content and its issue set are.
    pub fn is_done(&self) -> bool {
        self.content_completed && self.issues_completed
    }

    pub fn issue(&self, number: IssueNumber) -> Option<&IssueRecord> {
        self.issues.get(&number.to_string())
    }

    pub fn issue_mut(&mut self, number: IssueNumber) -> &mut IssueRecord {
        self.issues.entry(number.to_string()).or_default()
    }
}

// On-disk shape accepted by the reader: every field optional so that both the
// current and the legacy layout deserialize.
#[derive(Deserialize)]
struct StoredRepositoryRecord {
    #[serde(default)]
    completed: Option<bool>,
    #[serde(default)]
    content_completed: Option<bool>,
    #[serde(default)]
    issues_completed: Option<bool>,
    #[serde(default)]
    issues: BTreeMap<String, IssueRecord>,
}

#[derive(Deserialize)]
struct StoredDocument {
    #[serde(default)]
    repositories: BTreeMap<String, StoredRepositoryRecord>,
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// How the text handed to [`CheckpointDocument::parse`] was interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentHealth {
    /// Parsed as the current layout.
    Current,
    /// Parsed, but at least one repository used the legacy layout and was
    /// upgraded. The document should be written back.
    Upgraded,
    /// The text was empty or whitespace.
    Empty,
    /// The text could not be parsed; an empty document was substituted.
    Corrupt(String),
}

/// The full durable migration state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CheckpointDocument {
    pub repositories: BTreeMap<String, RepositoryRecord>,
}

impl CheckpointDocument {
    /// Interprets checkpoint text.
    ///
    /// Never fails: empty or unparsable text yields an empty document, trading
    /// possible redundant (idempotent) work for availability.
    pub fn parse(text: &str) -> (Self, DocumentHealth) {
        if text.trim().is_empty() {
            return (Self::default(), DocumentHealth::Empty);
        }

        let stored: StoredDocument = match serde_json::from_str(text) {
            Ok(doc) => doc,
            Err(e) => return (Self::default(), DocumentHealth::Corrupt(e.to_string())),
        };

        let mut upgraded = false;
        let repositories = stored
            .repositories
            .into_iter()
            .map(|(name, record)| {
                let legacy = record.completed.is_some()
                    || record.content_completed.is_none()
                    || record.issues_completed.is_none();
                upgraded |= legacy;

                let issues_completed = record
                    .issues_completed
                    .unwrap_or_else(|| record.issues.values().any(|issue| issue.completed));

                let upgraded_record = RepositoryRecord {
                    content_completed: record.content_completed.unwrap_or(false),
                    issues_completed,
                    issues: record.issues,
                };
                (name, upgraded_record)
            })
            .collect();

        let health = if upgraded {
            DocumentHealth::Upgraded
        } else {
            DocumentHealth::Current
        };
        (Self { repositories }, health)
    }

    /// Renders the document as pretty-printed JSON.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn repository(&self, name: &RepositoryName) -> Option<&RepositoryRecord> {
        self.repositories.get(name.as_str())
    }

    /// Returns the record for `name`, creating an all-false record if absent.
    ///
    /// The boolean is `true` when the record was created by this call.
    pub fn ensure_repository(&mut self, name: &RepositoryName) -> (&mut RepositoryRecord, bool) {
        let created = !self.repositories.contains_key(name.as_str());
        let record = self
            .repositories
            .entry(name.as_str().to_owned())
            .or_default();
        (record, created)
    }

    /// Names of repositories whose content and issue set are both complete.
    pub fn completed_repositories(&self) -> BTreeSet<RepositoryName> {
        self.repositories
            .iter()
            .filter(|(_, record)| record.is_done())
            .filter_map(|(name, _)| RepositoryName::new(name.clone()))
            .collect()
    }

    /// Source issue numbers marked complete in `name`.
    ///
    /// Keys that are not valid issue numbers are ignored.
    pub fn completed_issues(&self, name: &RepositoryName) -> BTreeSet<IssueNumber> {
        self.repository(name)
            .map(|record| {
                record
                    .issues
                    .iter()
                    .filter(|(_, issue)| issue.completed)
                    .filter_map(|(key, _)| key.parse().ok())
                    .collect()
            })
            .unwrap_or_default()
    }
}
