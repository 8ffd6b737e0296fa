use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, WorkerError};

/// Where migration scripts live, as templates over `{project}` and
/// `{version}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptPaths {
    /// Build root of a freshly built package.
    pub primary: String,
    /// Installed package, used when the build root is gone.
    pub fallback: String,
    /// Local source checkout, used instead of both in debug mode.
    pub debug: String,
}

impl Default for ScriptPaths {
    fn default() -> Self {
        Self {
            primary: "/home/release/buildroot/{project}-{version}/var/pkg/{project}-{version}/misc/tools/migration.php".to_string(),
            fallback: "/var/pkg/{project}-{version}/misc/tools/migration.php".to_string(),
            debug: "../{project}/misc/tools/migration.php".to_string(),
        }
    }
}

/// Resolves the migration script of a project build.
///
/// In debug mode the debug template always wins. Otherwise the primary path
/// is used if it exists, and the fallback path if not; the fallback is not
/// checked, a missing script surfaces when it is run.
#[derive(Clone, Debug)]
pub struct ScriptLocator {
    paths: ScriptPaths,
    debug: bool,
}

impl ScriptLocator {
    pub fn new(paths: ScriptPaths, debug: bool) -> Self {
        Self { paths, debug }
    }

    pub fn locate(&self, project: &str, version: &str) -> Result<PathBuf> {
        check_component("project", project)?;
        check_component("version", version)?;

        let path = if self.debug {
            render(&self.paths.debug, project, version)
        } else {
            let primary = render(&self.paths.primary, project, version);
            if primary.exists() {
                primary
            } else {
                debug!(path = %primary.display(), "primary migration script missing, using fallback");
                render(&self.paths.fallback, project, version)
            }
        };
        Ok(path)
    }
}

fn render(template: &str, project: &str, version: &str) -> PathBuf {
    PathBuf::from(
        template
            .replace("{project}", project)
            .replace("{version}", version),
    )
}

/// Project and version are spliced into paths, so they must stay a single
/// path component.
fn check_component(what: &str, value: &str) -> Result<()> {
    let single = Path::new(value).file_name().is_some_and(|name| name == value);
    if value.is_empty() || value.starts_with('.') || value.contains('\\') || !single {
        return Err(WorkerError::InvalidTask(format!("unusable {what} {value:?}")));
    }
    Ok(())
}
