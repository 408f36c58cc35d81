//! GitHub JSON shapes and their conversion into domain descriptors.
//!
//! Only the fields the migration reads are declared; serde ignores the rest.

use migration::{
    CommentDescriptor, CreatedIssue, IssueComments, IssueDescriptor, IssueNumber, IssueState,
    RepositoryDescriptor, RepositoryName, Timestamp,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub(crate) struct UserWire {
    pub login: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RepositoryWire {
    pub name: String,
    #[serde(default)]
    pub private: bool,
    pub description: Option<String>,
}

impl RepositoryWire {
    pub fn into_descriptor(self) -> Option<RepositoryDescriptor> {
        Some(RepositoryDescriptor {
            name: RepositoryName::new(self.name)?,
            private: self.private,
            description: self.description,
        })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CommentWire {
    pub body: Option<String>,
    pub user: Option<UserWire>,
    pub created_at: Option<String>,
}

impl From<CommentWire> for CommentDescriptor {
    fn from(wire: CommentWire) -> Self {
        CommentDescriptor {
            body: wire.body,
            author: wire.user.map(|u| u.login),
            created_at: wire.created_at.as_deref().and_then(Timestamp::parse_rfc3339),
        }
    }
}

/// The `comments` field is a count in issue listings; some payloads carry the
/// comments inline instead.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum CommentsWire {
    Count(u64),
    List(Vec<CommentWire>),
}

impl Default for CommentsWire {
    fn default() -> Self {
        CommentsWire::Count(0)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct IssueWire {
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    pub state: String,
    pub user: Option<UserWire>,
    pub created_at: Option<String>,
    #[serde(default)]
    pub comments: CommentsWire,
    /// Present only when the "issue" is a pull request.
    pub pull_request: Option<serde_json::Value>,
}

impl IssueWire {
    pub fn is_pull_request(&self) -> bool {
        self.pull_request.is_some()
    }

    pub fn into_descriptor(self) -> IssueDescriptor {
        let state = if self.state.eq_ignore_ascii_case("closed") {
            IssueState::Closed
        } else {
            IssueState::Open
        };
        let comments = match self.comments {
            CommentsWire::Count(n) => IssueComments::Count(n),
            CommentsWire::List(list) => {
                IssueComments::List(list.into_iter().map(CommentDescriptor::from).collect())
            }
        };
        IssueDescriptor {
            number: IssueNumber::new(self.number),
            title: self.title,
            body: self.body,
            state,
            author: self.user.map(|u| u.login),
            created_at: self.created_at.as_deref().and_then(Timestamp::parse_rfc3339),
            comments,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreatedIssueWire {
    pub number: u64,
}

impl From<CreatedIssueWire> for CreatedIssue {
    fn from(wire: CreatedIssueWire) -> Self {
        CreatedIssue {
            number: IssueNumber::new(wire.number),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorWire {
    pub message: Option<String>,
}

// Request bodies.

#[derive(Debug, Serialize)]
pub(crate) struct CreateRepositoryRequest<'a> {
    pub name: &'a str,
    pub private: bool,
    #[serde(skip_serializing_if = "str::is_empty")]
    pub description: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateIssueRequest<'a> {
    pub title: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    pub body: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct UpdateIssueStateRequest<'a> {
    pub state: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateCommentRequest<'a> {
    pub body: &'a str,
}
