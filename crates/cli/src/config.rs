//! Layered run configuration: command-line flags, then the optional TOML
//! file, then built-in defaults.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context};
use migration::{MigrationSettings, OrganizationName, RateLimits, RepositoryName};
use serde::Deserialize;

use crate::args::{MigrateArgs, DEFAULT_STATE_FILE};

/// Contents of a `--config` file. Every key is optional.
///
/// ```toml
/// state_file = "acme.json"
/// issues_per_min = 15
/// migrate_content = false
/// repositories = ["api", "web"]
/// ```
#[derive(Debug, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub token: Option<String>,
    pub state_file: Option<PathBuf>,
    pub issues_per_min: Option<u32>,
    pub comments_per_min: Option<u32>,
    pub migrate_content: Option<bool>,
    pub private: Option<bool>,
    pub repositories: Vec<String>,
    pub api_url: Option<String>,
    pub git_host: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&text)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }
}

/// Everything the composition root needs to build a run.
#[derive(Debug)]
pub struct RunConfig {
    pub settings: MigrationSettings,
    pub token: String,
    pub state_file: PathBuf,
    pub api_url: String,
    pub git_host: String,
}

pub fn resolve(args: &MigrateArgs, file: FileConfig) -> anyhow::Result<RunConfig> {
    let source_org = OrganizationName::new(args.source_org.trim())
        .ok_or_else(|| anyhow!("source organization must not be empty"))?;
    let target_org = OrganizationName::new(args.target_org.trim())
        .ok_or_else(|| anyhow!("target organization must not be empty"))?;

    let Some(token) = args.token.clone().or(file.token).filter(|t| !t.trim().is_empty()) else {
        bail!("no access token: pass --token, set GITHUB_TOKEN, or add `token` to the config file");
    };

    let defaults = RateLimits::default();
    let rate_limits = RateLimits {
        issues_per_minute: args
            .issues_per_min
            .or(file.issues_per_min)
            .unwrap_or(defaults.issues_per_minute),
        comments_per_minute: args
            .comments_per_min
            .or(file.comments_per_min)
            .unwrap_or(defaults.comments_per_minute),
    };

    let names = if args.repositories.is_empty() {
        file.repositories
    } else {
        args.repositories.clone()
    };
    let only_repositories = names
        .into_iter()
        .map(|name| {
            RepositoryName::new(name.trim()).ok_or_else(|| anyhow!("repository names must not be empty"))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let mut settings = MigrationSettings::new(source_org, target_org);
    settings.migrate_content = !args.no_content && file.migrate_content.unwrap_or(true);
    settings.private_repositories = !args.public && file.private.unwrap_or(true);
    settings.only_repositories = only_repositories;
    settings.rate_limits = rate_limits;
    settings.validate()?;

    Ok(RunConfig {
        settings,
        token,
        state_file: args
            .state_file
            .clone()
            .or(file.state_file)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_FILE)),
        api_url: args
            .api_url
            .clone()
            .or(file.api_url)
            .unwrap_or_else(|| github::DEFAULT_API_URL.to_owned()),
        git_host: args
            .git_host
            .clone()
            .or(file.git_host)
            .unwrap_or_else(|| transfer::DEFAULT_GIT_HOST.to_owned()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::{Cli, Command};
    use clap::Parser;

    fn migrate_args(extra: &[&str]) -> MigrateArgs {
        let mut argv = vec!["org-migrate", "migrate", "old-org", "new-org"];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv).unwrap().command {
            Command::Migrate(args) => args,
            Command::Status(_) => panic!("expected migrate"),
        }
    }

    #[test]
    fn defaults_apply_without_file() {
        let run = resolve(&migrate_args(&["--token", "abc"]), FileConfig::default()).unwrap();
        assert_eq!(run.token, "abc");
        assert_eq!(run.state_file, PathBuf::from("migration_state.json"));
        assert_eq!(run.api_url, "https://api.github.com");
        assert_eq!(run.git_host, "github.com");
        assert_eq!(run.settings.rate_limits, RateLimits::default());
        assert!(run.settings.migrate_content);
        assert!(run.settings.private_repositories);
        assert!(run.settings.only_repositories.is_empty());
    }

    #[test]
    fn file_values_fill_unset_flags() {
        let file: FileConfig = toml::from_str(
            r#"
            token = "from-file"
            state_file = "acme.json"
            issues_per_min = 7
            comments_per_min = 9
            migrate_content = false
            repositories = ["api"]
            "#,
        )
        .unwrap();
        let run = resolve(&migrate_args(&["--token", "abc", "--issues-per-min", "3"]), file).unwrap();

        assert_eq!(run.token, "abc");
        assert_eq!(run.state_file, PathBuf::from("acme.json"));
        assert_eq!(run.settings.rate_limits.issues_per_minute, 3);
        assert_eq!(run.settings.rate_limits.comments_per_minute, 9);
        assert!(!run.settings.migrate_content);
        assert_eq!(
            run.settings.only_repositories,
            vec![RepositoryName::new("api").unwrap()]
        );
    }

    #[test]
    fn repository_flags_replace_file_list() {
        let file = FileConfig {
            repositories: vec!["api".into()],
            ..FileConfig::default()
        };
        let run = resolve(&migrate_args(&["--token", "t", "--repository", "web"]), file).unwrap();
        assert_eq!(
            run.settings.only_repositories,
            vec![RepositoryName::new("web").unwrap()]
        );
    }

    #[test]
    fn missing_token_is_an_error() {
        let mut args = migrate_args(&[]);
        args.token = None;
        let err = resolve(&args, FileConfig::default()).unwrap_err();
        assert!(err.to_string().contains("no access token"));
    }

    #[test]
    fn zero_rate_is_rejected() {
        let err = resolve(
            &migrate_args(&["--token", "t", "--comments-per-min", "0"]),
            FileConfig::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("comments per minute"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(toml::from_str::<FileConfig>("tokne = \"x\"").is_err());
    }

    #[test]
    fn config_file_is_loaded_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("migrate.toml");
        std::fs::write(&path, "git_host = \"ghe.example.com\"\nprivate = false\n").unwrap();

        let file = FileConfig::load(&path).unwrap();
        assert_eq!(file.git_host.as_deref(), Some("ghe.example.com"));
        assert_eq!(file.private, Some(false));
        assert!(FileConfig::load(&dir.path().join("missing.toml")).is_err());
    }
}
