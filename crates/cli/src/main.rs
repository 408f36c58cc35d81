//! `org-migrate` entry point.
//!
//! This binary is the composition root for the entire system. Responsibilities:
//!
//! 1. **Parse configuration**: command-line flags layered over an optional
//!    TOML file and validated into [`migration::MigrationSettings`].
//! 2. **Wire observability**: `tracing-subscriber` with a text or JSON layer
//!    and, when an endpoint is given, an OpenTelemetry OTLP exporter. All
//!    `tracing` spans and events from every crate flow through it.
//! 3. **Construct infrastructure**: [`github::GitHubClient`],
//!    [`transfer::GitMirrorTransfer`], and [`checkpoint::JsonCheckpointStore`],
//!    injected into the [`engine::Migrator`].
//! 4. **Run and report**: Ctrl-C requests a shutdown at the next unit
//!    boundary; the exit code is 0 only when every repository completed,
//!    including its content.

mod args;
mod config;
mod report;
mod telemetry;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use checkpoint::JsonCheckpointStore;
use clap::Parser;
use engine::{Migrator, RunOutcome, ShutdownSignal};
use github::GitHubClient;
use migration::ProgressStore;
use tracing::{error, warn};
use transfer::GitMirrorTransfer;

use crate::args::{Cli, Command, MigrateArgs, StatusArgs};
use crate::config::FileConfig;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let _telemetry = match telemetry::init(cli.log_format, cli.otlp_endpoint.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("error: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Command::Migrate(args) => migrate(args).await,
        Command::Status(args) => status(&args),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            error!(error = %format!("{e:#}"), "fatal error");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn migrate(args: MigrateArgs) -> anyhow::Result<ExitCode> {
    let file = match &args.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let run = config::resolve(&args, file)?;
    print!("{}", report::banner(&run));

    let store = JsonCheckpointStore::open(&run.state_file)
        .with_context(|| format!("failed to open state file {}", run.state_file.display()))?;
    let remote = GitHubClient::new(&run.api_url, &run.token).context("failed to build GitHub client")?;
    let transfer = GitMirrorTransfer::new(run.token.clone()).with_host(run.git_host.clone());

    let shutdown = ShutdownSignal::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received; stopping after the current unit");
                shutdown.request();
            }
        }
    });

    let migrator = Migrator::new(
        run.settings,
        Arc::new(remote),
        Arc::new(transfer),
        Arc::new(store),
    )?
    .with_shutdown(shutdown);

    let code = match migrator.migrate_organization().await? {
        RunOutcome::Completed {
            repositories,
            content_pending,
        } if content_pending.is_empty() => {
            println!("Migration completed: {repositories} repositories migrated.");
            ExitCode::SUCCESS
        }
        RunOutcome::Completed {
            repositories,
            content_pending,
        } => {
            println!("Migration completed: {repositories} repositories processed.");
            eprintln!("{}", report::content_pending(&content_pending));
            eprintln!("{}", report::RESUME_HINT);
            ExitCode::FAILURE
        }
        RunOutcome::Failed { repository, reason } => {
            eprintln!("Migration failed at {repository}: {reason}");
            eprintln!("{}", report::RESUME_HINT);
            ExitCode::FAILURE
        }
        RunOutcome::Interrupted => {
            eprintln!("Migration interrupted.");
            eprintln!("{}", report::RESUME_HINT);
            ExitCode::FAILURE
        }
    };
    Ok(code)
}

fn status(args: &StatusArgs) -> anyhow::Result<ExitCode> {
    if !args.state_file.exists() {
        println!("No state file at {}.", args.state_file.display());
        return Ok(ExitCode::SUCCESS);
    }
    let store = JsonCheckpointStore::open(&args.state_file)
        .with_context(|| format!("failed to open state file {}", args.state_file.display()))?;
    let doc = store.snapshot().context("failed to read state file")?;
    print!("{}", report::status(&doc));
    Ok(ExitCode::SUCCESS)
}
