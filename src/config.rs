use crate::changelog::{DEFAULT_CHANGELOG_COLLECTION, ShippedChangeLog};
use crate::core::{FixError, Result};
use crate::mutator::{MalformedRecordPolicy, RunMode};
use crate::store::validate_collection_name;
use std::path::{Path, PathBuf};

pub const STORE_PATH_VAR: &str = "DOCFIX_STORE_PATH";
pub const CHANGELOG_COLLECTION_VAR: &str = "DOCFIX_CHANGELOG_COLLECTION";
pub const ON_MALFORMED_VAR: &str = "DOCFIX_ON_MALFORMED";
pub const CHANGELOG_VAR: &str = "DOCFIX_CHANGELOG";

const DEFAULT_STORE_PATH: &str = "docfix-store.json";

/// Settings for one docfix run.
#[derive(Debug, Clone, PartialEq)]
pub struct FixConfig {
    /// JSON store file
    pub store_path: PathBuf,

    /// Collection recording applied change sets
    pub changelog_collection: String,

    /// Which shipped change log to run
    pub changelog: ShippedChangeLog,

    pub on_malformed: MalformedRecordPolicy,

    pub mode: RunMode,
}

impl FixConfig {
    pub fn new(store_path: impl Into<PathBuf>) -> Self {
        Self {
            store_path: store_path.into(),
            changelog_collection: DEFAULT_CHANGELOG_COLLECTION.to_string(),
            changelog: ShippedChangeLog::default(),
            on_malformed: MalformedRecordPolicy::default(),
            mode: RunMode::default(),
        }
    }

    /// Reads `DOCFIX_*` environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config =
            Self::new(lookup(STORE_PATH_VAR).unwrap_or_else(|| DEFAULT_STORE_PATH.to_string()));

        if let Some(collection) = lookup(CHANGELOG_COLLECTION_VAR) {
            config.changelog_collection = collection;
        }
        if let Some(changelog) = lookup(CHANGELOG_VAR) {
            config.changelog = changelog.parse().map_err(|_| {
                FixError::Config(format!(
                    "{} must be 'declarations' or 'legacy', got '{}'",
                    CHANGELOG_VAR, changelog
                ))
            })?;
        }
        if let Some(policy) = lookup(ON_MALFORMED_VAR) {
            config.on_malformed = policy.parse().map_err(|_| {
                FixError::Config(format!(
                    "{} must be 'skip' or 'abort', got '{}'",
                    ON_MALFORMED_VAR, policy
                ))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn store_path(mut self, path: impl AsRef<Path>) -> Self {
        self.store_path = path.as_ref().to_path_buf();
        self
    }

    pub fn changelog_collection(mut self, collection: &str) -> Self {
        self.changelog_collection = collection.to_string();
        self
    }

    pub fn changelog(mut self, changelog: ShippedChangeLog) -> Self {
        self.changelog = changelog;
        self
    }

    pub fn on_malformed(mut self, policy: MalformedRecordPolicy) -> Self {
        self.on_malformed = policy;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.mode = if dry_run { RunMode::DryRun } else { RunMode::Apply };
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.store_path.as_os_str().is_empty() {
            return Err(FixError::Config("store path cannot be empty".to_string()));
        }
        validate_collection_name(&self.changelog_collection)
            .map_err(|e| FixError::Config(e.to_string()))
    }
}

impl Default for FixConfig {
    fn default() -> Self {
        Self::new(DEFAULT_STORE_PATH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = FixConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, FixConfig::default());
        assert_eq!(config.store_path, PathBuf::from("docfix-store.json"));
        assert_eq!(config.changelog_collection, "dbchangelog");
        assert_eq!(config.changelog, ShippedChangeLog::Declarations);
        assert_eq!(config.on_malformed, MalformedRecordPolicy::Skip);
        assert_eq!(config.mode, RunMode::Apply);
    }

    #[test]
    fn test_environment_overrides() {
        let config = FixConfig::from_lookup(lookup_from(&[
            (STORE_PATH_VAR, "/var/lib/exports/store.json"),
            (CHANGELOG_COLLECTION_VAR, "migrations"),
            (ON_MALFORMED_VAR, "abort"),
            (CHANGELOG_VAR, "legacy"),
        ]))
        .unwrap();

        assert_eq!(config.store_path, PathBuf::from("/var/lib/exports/store.json"));
        assert_eq!(config.changelog_collection, "migrations");
        assert_eq!(config.on_malformed, MalformedRecordPolicy::Abort);
        assert_eq!(config.changelog, ShippedChangeLog::Legacy);
    }

    #[test]
    fn test_invalid_environment() {
        assert!(FixConfig::from_lookup(lookup_from(&[(ON_MALFORMED_VAR, "ignore")])).is_err());
        assert!(FixConfig::from_lookup(lookup_from(&[(CHANGELOG_COLLECTION_VAR, "db-log")])).is_err());
        assert!(FixConfig::from_lookup(lookup_from(&[(STORE_PATH_VAR, "")])).is_err());
        assert!(FixConfig::from_lookup(lookup_from(&[(CHANGELOG_VAR, "mongock")])).is_err());
    }

    #[test]
    fn test_builder_pattern() {
        let config = FixConfig::default()
            .store_path("fixtures/store.json")
            .changelog_collection("migrations")
            .on_malformed(MalformedRecordPolicy::Abort)
            .dry_run(true);

        assert_eq!(config.store_path, PathBuf::from("fixtures/store.json"));
        assert_eq!(config.changelog_collection, "migrations");
        assert_eq!(config.mode, RunMode::DryRun);
        assert!(config.validate().is_ok());
    }
}
