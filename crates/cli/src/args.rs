//! Command-line surface.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

pub const DEFAULT_STATE_FILE: &str = "migration_state.json";

#[derive(Debug, Parser)]
#[command(
    name = "org-migrate",
    version,
    about = "Resumable migration of repositories, issues, and comments between GitHub organizations"
)]
pub struct Cli {
    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Export spans to this OTLP (gRPC) collector.
    #[arg(long, global = true, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Migrate (or resume migrating) every repository of an organization.
    Migrate(MigrateArgs),
    /// Show what the state file records as complete.
    Status(StatusArgs),
}

/// Flags left unset fall back to the config file, then to built-in defaults.
#[derive(Debug, Args)]
pub struct MigrateArgs {
    /// Organization to copy from.
    pub source_org: String,

    /// Organization to copy into.
    pub target_org: String,

    /// Access token with `repo` and `workflow` scopes.
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Checkpoint file recording progress [default: migration_state.json].
    #[arg(long, value_name = "PATH")]
    pub state_file: Option<PathBuf>,

    /// Issue creations and closes per minute [default: 20].
    #[arg(long, value_name = "N")]
    pub issues_per_min: Option<u32>,

    /// Comment creations per minute [default: 20].
    #[arg(long, value_name = "N")]
    pub comments_per_min: Option<u32>,

    /// Skip branches, tags, and large-file objects; migrate issues only.
    #[arg(long)]
    pub no_content: bool,

    /// Create target repositories as public.
    #[arg(long)]
    pub public: bool,

    /// Only migrate this repository. Repeatable.
    #[arg(long = "repository", value_name = "NAME")]
    pub repositories: Vec<String>,

    /// REST API base URL, for GitHub Enterprise Server.
    #[arg(long, value_name = "URL")]
    pub api_url: Option<String>,

    /// Host used in git clone and push URLs.
    #[arg(long, value_name = "HOST")]
    pub git_host: Option<String>,

    /// TOML file supplying any of the options above.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct StatusArgs {
    #[arg(long, value_name = "PATH", default_value = DEFAULT_STATE_FILE)]
    pub state_file: PathBuf,
}
