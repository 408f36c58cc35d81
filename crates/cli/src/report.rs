//! Human-readable text for the banner and the `status` command.

use std::fmt::Write as _;

use migration::{CheckpointDocument, RepositoryName};

use crate::config::RunConfig;

pub const RESUME_HINT: &str = "Run the same command again to resume from where it left off.";

pub fn banner(run: &RunConfig) -> String {
    let settings = &run.settings;
    let scope = if settings.only_repositories.is_empty() {
        "all repositories".to_owned()
    } else {
        settings
            .only_repositories
            .iter()
            .map(RepositoryName::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    };
    format!(
        "Migrating {source} -> {target}\n\
         \x20 repositories: {scope}\n\
         \x20 state file:   {state}\n\
         \x20 rate limits:  {issues} issues/min, {comments} comments/min\n\
         \x20 content:      {content}\n",
        source = settings.source_org,
        target = settings.target_org,
        state = run.state_file.display(),
        issues = settings.rate_limits.issues_per_minute,
        comments = settings.rate_limits.comments_per_minute,
        content = if settings.migrate_content { "enabled" } else { "disabled" },
    )
}

/// Lists repositories whose issues are migrated but whose content is not.
pub fn content_pending(names: &[RepositoryName]) -> String {
    let mut out = format!("Content transfer pending for {} repositories:", names.len());
    for name in names {
        let _ = write!(out, "\n  {name}");
    }
    out
}

/// Summarises a checkpoint document: completed repositories first, then
/// per-repository progress.
pub fn status(doc: &CheckpointDocument) -> String {
    let mut out = String::new();
    if doc.repositories.is_empty() {
        out.push_str("No progress recorded.\n");
        return out;
    }

    let completed = doc.completed_repositories();
    let _ = writeln!(out, "Completed repositories: {}", completed.len());
    for name in &completed {
        let _ = writeln!(out, "  {name}");
    }

    out.push_str("Progress:\n");
    for (name, record) in &doc.repositories {
        let issues = record.issues.values().filter(|i| i.completed).count();
        let _ = writeln!(
            out,
            "  {name}: content {}, issues {} ({issues} completed)",
            done(record.content_completed),
            done(record.issues_completed),
        );
    }
    out
}

fn done(flag: bool) -> &'static str {
    if flag {
        "done"
    } else {
        "pending"
    }
}
