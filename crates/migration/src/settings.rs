//! Run settings shared by the orchestrator and the composition root.

use serde::{Deserialize, Serialize};

use crate::{MigrationError, OrganizationName, RepositoryName};

/// Default per-minute ceiling for both write classes.
pub const DEFAULT_WRITES_PER_MINUTE: u32 = 20;

/// Per-minute write ceilings, one per rate class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimits {
    pub issues_per_minute: u32,
    pub comments_per_minute: u32,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            issues_per_minute: DEFAULT_WRITES_PER_MINUTE,
            comments_per_minute: DEFAULT_WRITES_PER_MINUTE,
        }
    }
}

/// What to migrate, from where, to where.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationSettings {
    pub source_org: OrganizationName,
    pub target_org: OrganizationName,
    /// Transfer branches, tags, and large-file objects before issues.
    pub migrate_content: bool,
    /// Create target repositories as private.
    pub private_repositories: bool,
    /// Restrict the run to these repositories. Empty means all of them.
    pub only_repositories: Vec<RepositoryName>,
    pub rate_limits: RateLimits,
}

impl MigrationSettings {
    /// Creates settings with defaults: content enabled, private targets,
    /// every repository, default rate limits.
    pub fn new(source_org: OrganizationName, target_org: OrganizationName) -> Self {
        Self {
            source_org,
            target_org,
            migrate_content: true,
            private_repositories: true,
            only_repositories: Vec::new(),
            rate_limits: RateLimits::default(),
        }
    }

    /// Checks invariants that cannot be expressed in the types.
    ///
    /// # Errors
    ///
    /// [`MigrationError::Configuration`] when source and target are the same
    /// organization or when either rate ceiling is zero.
    pub fn validate(&self) -> Result<(), MigrationError> {
        if self.source_org == self.target_org {
            return Err(MigrationError::Configuration {
                message: format!(
                    "source and target organization are both '{}'",
                    self.source_org
                ),
            });
        }
        if self.rate_limits.issues_per_minute == 0 {
            return Err(MigrationError::Configuration {
                message: "issues per minute must be at least 1".into(),
            });
        }
        if self.rate_limits.comments_per_minute == 0 {
            return Err(MigrationError::Configuration {
                message: "comments per minute must be at least 1".into(),
            });
        }
        Ok(())
    }

    /// Returns `true` if `name` is selected by the repository filter.
    pub fn includes(&self, name: &RepositoryName) -> bool {
        self.only_repositories.is_empty() || self.only_repositories.contains(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn org(name: &str) -> OrganizationName {
        OrganizationName::new(name).unwrap()
    }

    #[test]
    fn defaults_validate() {
        let settings = MigrationSettings::new(org("old"), org("new"));
        assert!(settings.validate().is_ok());
        assert!(settings.migrate_content);
        assert_eq!(settings.rate_limits.issues_per_minute, 20);
    }

    #[test]
    fn same_organization_is_rejected() {
        let settings = MigrationSettings::new(org("acme"), org("acme"));
        assert!(matches!(
            settings.validate(),
            Err(MigrationError::Configuration { .. })
        ));
    }

    #[test]
    fn zero_ceiling_is_rejected() {
        let mut settings = MigrationSettings::new(org("old"), org("new"));
        settings.rate_limits.comments_per_minute = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn empty_filter_includes_everything() {
        let mut settings = MigrationSettings::new(org("old"), org("new"));
        let api = RepositoryName::new("api").unwrap();
        let web = RepositoryName::new("web").unwrap();
        assert!(settings.includes(&api));

        settings.only_repositories = vec![web.clone()];
        assert!(!settings.includes(&api));
        assert!(settings.includes(&web));
    }
}
