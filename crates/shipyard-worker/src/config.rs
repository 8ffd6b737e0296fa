use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use shipyard_merge::{
    ManifestCatalog, RepositoryCatalog, ResolverSettings, StaticCatalog, TrainingSettings,
};
use shipyard_refs::{validate_branch_name, BranchFilter, BranchPolicy};

use crate::error::ConfigError;
use crate::locator::{ScriptLocator, ScriptPaths};
use crate::migration::MigrationSettings;

/// Split a comma-separated list, dropping empty entries.
///
/// ```
/// assert_eq!(shipyard_worker::parse_list("master,,develop, "), ["master", "develop"]);
/// ```
pub fn parse_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

// ---------------------------------------------------------------------------
// WorkerConfig
// ---------------------------------------------------------------------------

/// Worker configuration. Every field has a default, so an empty file is a
/// valid configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkerConfig {
    /// Instance number; selects the workspace directory under `pool_dir`.
    pub instance: u32,
    pub pool_dir: PathBuf,
    pub lock_dir: PathBuf,
    pub allowed_branches: Vec<String>,
    pub disallowed_branches: Vec<String>,
    /// Skip pushes, sleeping `dry_run_delay` seconds instead.
    pub dry_run: bool,
    pub dry_run_delay: u64,
    pub auto_resolve: bool,
    pub conflict_training: bool,
    pub training_branches: Vec<String>,
    pub rerere_script: PathBuf,
    pub mainline: String,
    pub debug: bool,
    /// Tracked repositories by name, used when `catalog` is not set.
    pub repositories: BTreeMap<String, String>,
    /// Packages manifest listing the tracked repositories.
    pub catalog: Option<PathBuf>,
    pub catalog_host_filter: String,
    pub migration: MigrationConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            instance: 0,
            pool_dir: PathBuf::from("/var/lib/shipyard/pool"),
            lock_dir: PathBuf::from("/var/lock/shipyard"),
            allowed_branches: Vec::new(),
            disallowed_branches: Vec::new(),
            dry_run: false,
            dry_run_delay: 3,
            auto_resolve: true,
            conflict_training: true,
            training_branches: vec!["develop".to_string(), "staging".to_string()],
            rerere_script: PathBuf::from("misc/tools/bash/rerere-train.sh"),
            mainline: "master".to_string(),
            debug: false,
            repositories: BTreeMap::new(),
            catalog: None,
            catalog_host_filter: String::new(),
            migration: MigrationConfig::default(),
        }
    }
}

impl WorkerConfig {
    /// Load and validate a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would only fail later, mid-task.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for branch in std::iter::once(&self.mainline).chain(&self.training_branches) {
            validate_branch_name(branch).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }
        if self.migration.interpreter.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "migration.interpreter must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn branch_filter(&self) -> BranchFilter {
        BranchFilter::new(BranchPolicy::new(
            self.allowed_branches.iter().map(String::as_str),
            self.disallowed_branches.iter().map(String::as_str),
        ))
    }

    pub fn catalog(&self) -> Arc<dyn RepositoryCatalog> {
        match &self.catalog {
            Some(path) => Arc::new(ManifestCatalog::new(path, &self.catalog_host_filter)),
            None => Arc::new(StaticCatalog::new(self.repositories.clone())),
        }
    }

    pub fn resolver_settings(&self) -> ResolverSettings {
        ResolverSettings {
            pool_dir: self.pool_dir.clone(),
            instance: self.instance,
            lock_dir: self.lock_dir.clone(),
            mainline: self.mainline.clone(),
            auto_resolve: self.auto_resolve,
            training: (self.auto_resolve && self.conflict_training).then(|| TrainingSettings {
                branches: self.training_branches.clone(),
                script: self.rerere_script.clone(),
            }),
            dry_run: self
                .dry_run
                .then(|| Duration::from_secs(self.dry_run_delay)),
        }
    }

    pub fn script_locator(&self) -> ScriptLocator {
        ScriptLocator::new(self.migration.script_paths.clone(), self.debug)
    }

    pub fn migration_settings(&self) -> MigrationSettings {
        MigrationSettings {
            worker_name: self.migration.worker_name.clone(),
            interpreter: self.migration.interpreter.clone(),
            progress_host: self.migration.progress_host.clone(),
            progress_port: self.migration.progress_port,
            timeout: self.migration.timeout.map(Duration::from_secs),
        }
    }
}

// ---------------------------------------------------------------------------
// MigrationConfig
// ---------------------------------------------------------------------------

/// The `[migration]` section.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MigrationConfig {
    /// Name this migration worker consumes tasks for. Tasks addressed to
    /// another worker are requeued.
    pub worker_name: String,
    pub interpreter: String,
    pub script_paths: ScriptPaths,
    /// Where the migration script reports progress.
    pub progress_host: String,
    pub progress_port: u16,
    /// Seconds after which a running migration is killed. Unset means never.
    pub timeout: Option<u64>,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            worker_name: String::new(),
            interpreter: "php".to_string(),
            script_paths: ScriptPaths::default(),
            progress_host: "127.0.0.1".to_string(),
            progress_port: 8099,
            timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config: WorkerConfig = toml::from_str("").unwrap();
        assert_eq!(config, WorkerConfig::default());
        assert_eq!(config.mainline, "master");
        assert_eq!(config.training_branches, ["develop", "staging"]);
        assert!(config.branch_filter().is_allowed("anything"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parses_a_full_file() {
        let text = r#"
            instance = 2
            pool_dir = "/srv/pool"
            allowed_branches = ["master"]
            dry_run = true
            dry_run_delay = 1
            conflict_training = false

            [repositories]
            api = "ssh://git/deploy/api"

            [migration]
            worker_name = "crm-prod"
            interpreter = "/usr/bin/php8"
            timeout = 3600

            [migration.script_paths]
            fallback = "/opt/{project}/{version}/migration.php"
        "#;
        let config: WorkerConfig = toml::from_str(text).unwrap();

        let settings = config.resolver_settings();
        assert_eq!(settings.instance, 2);
        assert_eq!(settings.dry_run, Some(Duration::from_secs(1)));
        assert!(settings.training.is_none());

        let filter = config.branch_filter();
        assert!(filter.is_allowed("master"));
        assert!(!filter.is_allowed("develop"));

        assert_eq!(config.catalog().repositories().unwrap().len(), 1);
        assert_eq!(config.migration.worker_name, "crm-prod");
        assert_eq!(config.migration_settings().worker_name, "crm-prod");
        assert_eq!(config.migration_settings().timeout, Some(Duration::from_secs(3600)));
        assert_eq!(
            config.migration.script_paths.fallback,
            "/opt/{project}/{version}/migration.php"
        );
        assert_eq!(
            config.migration.script_paths.primary,
            ScriptPaths::default().primary
        );
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(toml::from_str::<WorkerConfig>("instanse = 1").is_err());
    }

    #[test]
    fn load_reports_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("worker.toml");
        fs::write(&path, "mainline = \"bad..name\"").unwrap();
        assert!(matches!(WorkerConfig::load(&path), Err(ConfigError::Invalid(_))));

        let missing = dir.path().join("missing.toml");
        match WorkerConfig::load(&missing) {
            Err(ConfigError::Read { path, .. }) => assert_eq!(path, missing),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn comma_separated_branch_lists_feed_the_filter() {
        let config = WorkerConfig {
            allowed_branches: parse_list("master,,develop, "),
            disallowed_branches: parse_list(""),
            ..WorkerConfig::default()
        };
        assert_eq!(config.allowed_branches, ["master", "develop"]);
        assert!(config.disallowed_branches.is_empty());
        let filter = config.branch_filter();
        assert!(filter.is_allowed("develop"));
        assert!(!filter.is_allowed("staging"));
    }

    #[test]
    fn training_needs_auto_resolve() {
        let config = WorkerConfig {
            auto_resolve: false,
            ..WorkerConfig::default()
        };
        assert!(config.resolver_settings().training.is_none());
    }
}
