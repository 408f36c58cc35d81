//! Body text for replayed issues, comments, and placeholders.
//!
//! The target records the migrating account as author and the migration time
//! as creation time, so the original author, time, and source repository are
//! appended to every replayed body as a footer.

use crate::{CommentDescriptor, IssueDescriptor, IssueNumber, RepositoryPath, Timestamp};

const UNKNOWN: &str = "unknown";

fn footer(
    verb: &str,
    author: Option<&str>,
    created_at: Option<Timestamp>,
    source: &RepositoryPath,
) -> String {
    let author = author.filter(|a| !a.is_empty()).unwrap_or(UNKNOWN);
    let created_at = created_at.map_or_else(|| UNKNOWN.to_owned(), |ts| ts.to_string());
    format!("\n\n---\n*Originally {verb} by @{author} on {created_at}*\n*Migrated from {source}*")
}

fn non_empty(body: Option<&str>) -> Option<&str> {
    body.filter(|b| !b.trim().is_empty())
}

/// Body for a replayed issue: the original text plus the attribution footer.
pub fn issue_body(issue: &IssueDescriptor, source: &RepositoryPath) -> String {
    let mut body = non_empty(issue.body.as_deref())
        .unwrap_or("*No description provided*")
        .to_owned();
    body.push_str(&footer("created", issue.author.as_deref(), issue.created_at, source));
    body
}

/// Body for a replayed comment.
pub fn comment_body(comment: &CommentDescriptor, source: &RepositoryPath) -> String {
    let mut body = non_empty(comment.body.as_deref())
        .unwrap_or("*No comment text*")
        .to_owned();
    body.push_str(&footer("posted", comment.author.as_deref(), comment.created_at, source));
    body
}

pub fn placeholder_title(number: IssueNumber) -> String {
    format!("[PLACEHOLDER] Issue #{number}")
}

/// Explains why a placeholder occupies `number`.
pub fn placeholder_body(number: IssueNumber, source: &RepositoryPath) -> String {
    format!(
        "This is a placeholder for missing issue #{number} from {source}.\n\n\
         The original issue may have been deleted, converted to a pull request, or never existed.\n\n\
         ---\n*Created during migration to maintain issue numbering*"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{IssueComments, IssueState, OrganizationName, RepositoryName};

    fn source() -> RepositoryPath {
        RepositoryPath::new(
            OrganizationName::new("old-org").unwrap(),
            RepositoryName::new("widgets").unwrap(),
        )
    }

    fn issue(body: Option<&str>) -> IssueDescriptor {
        IssueDescriptor {
            number: IssueNumber::new(4),
            title: "Crash on start".into(),
            body: body.map(str::to_owned),
            state: IssueState::Open,
            author: Some("octocat".into()),
            created_at: Timestamp::parse_rfc3339("2020-01-02T03:04:05Z"),
            comments: IssueComments::Count(0),
        }
    }

    #[test]
    fn issue_body_appends_attribution() {
        let body = issue_body(&issue(Some("It crashes.")), &source());
        assert_eq!(
            body,
            "It crashes.\n\n---\n*Originally created by @octocat on 2020-01-02T03:04:05Z*\n*Migrated from old-org/widgets*"
        );
    }

    #[test]
    fn empty_issue_body_gets_placeholder_sentence() {
        let body = issue_body(&issue(Some("  ")), &source());
        assert!(body.starts_with("*No description provided*\n\n---"));
        let body = issue_body(&issue(None), &source());
        assert!(body.starts_with("*No description provided*"));
    }

    #[test]
    fn comment_with_unknown_author_and_time() {
        let comment = CommentDescriptor {
            body: None,
            author: None,
            created_at: None,
        };
        let body = comment_body(&comment, &source());
        assert_eq!(
            body,
            "*No comment text*\n\n---\n*Originally posted by @unknown on unknown*\n*Migrated from old-org/widgets*"
        );
    }

    #[test]
    fn placeholder_text_names_the_missing_number() {
        let n = IssueNumber::new(2);
        assert_eq!(placeholder_title(n), "[PLACEHOLDER] Issue #2");
        assert!(placeholder_body(n, &source()).contains("missing issue #2 from old-org/widgets"));
    }
}
