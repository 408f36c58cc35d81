//! Running `git` as a child process under a time limit.

use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;

/// Captured result of a `git` invocation that ran to completion.
#[derive(Debug)]
pub(crate) struct GitOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Error)]
pub(crate) enum RunError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("did not finish within {} seconds", .0.as_secs())]
    TimedOut(Duration),
}

/// Runs `program args...` in `cwd`, killing it if it exceeds `limit`.
///
/// Interactive credential prompts are disabled so a rejected token fails
/// instead of hanging until the time limit.
pub(crate) async fn run<S: AsRef<OsStr>>(
    program: &Path,
    args: &[S],
    cwd: Option<&Path>,
    limit: Duration,
) -> Result<GitOutput, RunError> {
    let mut command = Command::new(program);
    command
        .args(args)
        .env("GIT_TERMINAL_PROMPT", "0")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }

    let output = tokio::time::timeout(limit, command.output())
        .await
        .map_err(|_| RunError::TimedOut(limit))?
        .map_err(|source| RunError::Spawn {
            program: program.display().to_string(),
            source,
        })?;

    Ok(GitOutput {
        success: output.status.success(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let result = run(
            Path::new("definitely-not-an-installed-program"),
            &["--version"],
            None,
            Duration::from_secs(5),
        )
        .await;
        assert!(matches!(result, Err(RunError::Spawn { .. })));
    }
}
