use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::error::{MergeError, Result};

/// Source of the tracked repositories, as a map from repository name to
/// clone URL.
pub trait RepositoryCatalog: Send + Sync {
    fn repositories(&self) -> Result<BTreeMap<String, String>>;
}

/// Repository name for a clone URL: everything after the last `/`.
///
/// ```
/// use shipyard_merge::repository_name;
///
/// assert_eq!(repository_name("git@git.example.net:deploy/api"), "api");
/// assert_eq!(repository_name("https://git.example.net/deploy/web.git"), "web.git");
/// ```
pub fn repository_name(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

// ---------------------------------------------------------------------------
// StaticCatalog
// ---------------------------------------------------------------------------

/// A fixed set of repositories, usually straight from configuration.
#[derive(Clone, Debug, Default)]
pub struct StaticCatalog {
    repositories: BTreeMap<String, String>,
}

impl StaticCatalog {
    pub fn new(repositories: BTreeMap<String, String>) -> Self {
        Self { repositories }
    }

    /// Build a catalog from clone URLs, naming each by [`repository_name`].
    pub fn from_urls<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let repositories = urls
            .into_iter()
            .map(Into::into)
            .map(|url| (repository_name(&url).to_string(), url))
            .collect();
        Self { repositories }
    }
}

impl RepositoryCatalog for StaticCatalog {
    fn repositories(&self) -> Result<BTreeMap<String, String>> {
        Ok(self.repositories.clone())
    }
}

// ---------------------------------------------------------------------------
// ManifestCatalog
// ---------------------------------------------------------------------------

/// Repositories listed in a packages manifest on disk.
///
/// The manifest is a JSON document of the form
/// `{"packages": {"<name>": {"dev-master": {"source": {"url": "..."}}}}}`.
/// Only packages whose source URL contains `host_filter` are tracked.
#[derive(Clone, Debug)]
pub struct ManifestCatalog {
    path: PathBuf,
    host_filter: String,
}

impl ManifestCatalog {
    pub fn new(path: impl Into<PathBuf>, host_filter: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            host_filter: host_filter.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Extract tracked repositories from manifest text.
    pub fn parse(&self, text: &str) -> Result<BTreeMap<String, String>> {
        let document: Value = serde_json::from_str(text).map_err(|e| {
            MergeError::Catalog(format!("invalid manifest {}: {e}", self.path.display()))
        })?;
        let packages = document
            .get("packages")
            .and_then(Value::as_object)
            .filter(|packages| !packages.is_empty())
            .ok_or_else(|| {
                MergeError::Catalog(format!(
                    "manifest {} has no packages",
                    self.path.display()
                ))
            })?;

        let mut repositories = BTreeMap::new();
        for (package, entry) in packages {
            let Some(url) = entry
                .pointer("/dev-master/source/url")
                .and_then(Value::as_str)
            else {
                debug!(package = %package, "package has no dev-master source, skipping");
                continue;
            };
            if !url.contains(&self.host_filter) {
                continue;
            }
            repositories.insert(repository_name(url).to_string(), url.to_string());
        }
        Ok(repositories)
    }
}

impl RepositoryCatalog for ManifestCatalog {
    fn repositories(&self) -> Result<BTreeMap<String, String>> {
        let text =
            fs::read_to_string(&self.path).map_err(|source| MergeError::io(&self.path, source))?;
        self.parse(&text)
    }
}
